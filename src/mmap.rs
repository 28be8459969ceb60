use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

/// A read-only view of one cabinet file's bytes.  The mapping is released
/// when the value is dropped.
pub(crate) struct MappedArchive {
    map: Option<Mmap>,
}

impl MappedArchive {
    pub(crate) fn open(path: &Path) -> io::Result<MappedArchive> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length mappings are not portable.
            return Ok(MappedArchive { map: None });
        }
        // SAFETY: the map is read-only and only lives for one header scan;
        // concurrent truncation of a cabinet being read is not supported.
        let map = unsafe { Mmap::map(&file)? };
        Ok(MappedArchive { map: Some(map) })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        match self.map {
            Some(ref map) => map,
            None => &[],
        }
    }
}
