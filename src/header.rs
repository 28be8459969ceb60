//! Cabinet header decoding.
//!
//! [`Preamble`] covers the fixed 36-byte header and the flag-gated fields
//! that follow it (reserve area, previous/next cabinet links).
//! [`ArchiveDescriptor`] is the per-file summary used for chain
//! resolution, and [`scan_entries`] re-reads just the size and name of
//! each file record.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;
use crate::string::{read_null_terminated_bytes, read_null_terminated_string};

/// A failure to decode a cabinet header.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HeaderError {
    #[error("not a cabinet file (invalid file signature)")]
    Signature,
    #[error("version {0}.{1} cabinet files are not supported")]
    Version(u8, u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A link to a neighbouring cabinet in a set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CabinetLink {
    /// File name of the linked cabinet.
    pub cabinet: String,
    /// Label of the disk the linked cabinet lives on.
    pub disk: String,
}

#[derive(Clone, Debug)]
pub(crate) struct Preamble {
    pub first_file_offset: u32,
    pub num_folders: u16,
    pub num_files: u16,
    pub flags: u16,
    pub set_id: u16,
    pub set_index: u16,
    pub header_reserve: Vec<u8>,
    pub folder_reserve_size: u8,
    pub data_reserve_size: u8,
    pub prev: Option<CabinetLink>,
    pub next: Option<CabinetLink>,
}

impl Preamble {
    pub(crate) fn read<R: Read>(
        reader: &mut R,
    ) -> Result<Preamble, HeaderError> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                HeaderError::Signature
            } else {
                HeaderError::Io(error)
            }
        })?;
        if &signature != consts::SIGNATURE_BYTES {
            return Err(HeaderError::Signature);
        }
        let _reserved1 = reader.read_u32::<LittleEndian>()?;
        let total_size = reader.read_u32::<LittleEndian>()?;
        if total_size > consts::MAX_TOTAL_CAB_SIZE {
            let message = format!(
                "Cabinet total size field is too large \
                 ({} bytes; max is {} bytes)",
                total_size,
                consts::MAX_TOTAL_CAB_SIZE
            );
            return Err(io::Error::new(io::ErrorKind::InvalidData, message)
                .into());
        }
        let _reserved2 = reader.read_u32::<LittleEndian>()?;
        let first_file_offset = reader.read_u32::<LittleEndian>()?;
        let _reserved3 = reader.read_u32::<LittleEndian>()?;
        let minor_version = reader.read_u8()?;
        let major_version = reader.read_u8()?;
        if major_version > consts::VERSION_MAJOR
            || major_version == consts::VERSION_MAJOR
                && minor_version > consts::VERSION_MINOR
        {
            return Err(HeaderError::Version(major_version, minor_version));
        }
        let num_folders = reader.read_u16::<LittleEndian>()?;
        let num_files = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let set_id = reader.read_u16::<LittleEndian>()?;
        let set_index = reader.read_u16::<LittleEndian>()?;
        let mut header_reserve_size = 0u16;
        let mut folder_reserve_size = 0u8;
        let mut data_reserve_size = 0u8;
        if (flags & consts::FLAG_RESERVE_PRESENT) != 0 {
            header_reserve_size = reader.read_u16::<LittleEndian>()?;
            folder_reserve_size = reader.read_u8()?;
            data_reserve_size = reader.read_u8()?;
        }
        let mut header_reserve = vec![0u8; header_reserve_size as usize];
        reader.read_exact(&mut header_reserve)?;
        let prev = if (flags & consts::FLAG_PREV_CABINET) != 0 {
            Some(read_link(reader)?)
        } else {
            None
        };
        let next = if (flags & consts::FLAG_NEXT_CABINET) != 0 {
            Some(read_link(reader)?)
        } else {
            None
        };
        Ok(Preamble {
            first_file_offset,
            num_folders,
            num_files,
            flags,
            set_id,
            set_index,
            header_reserve,
            folder_reserve_size,
            data_reserve_size,
            prev,
            next,
        })
    }
}

// Header strings predate the per-file UTF flag, so they are always read
// as 8-bit text.
fn read_link<R: Read>(reader: &mut R) -> io::Result<CabinetLink> {
    let cabinet = read_null_terminated_string(reader, false)?;
    let disk = read_null_terminated_string(reader, false)?;
    Ok(CabinetLink { cabinet, disk })
}

/// Summary of one physical cabinet file, as needed to walk its set.
#[derive(Clone, Debug)]
pub struct ArchiveDescriptor {
    path: PathBuf,
    name: String,
    entry_count: u16,
    entry_offset: u32,
    ordinal: u16,
    set_id: u16,
    previous: String,
    next: String,
}

impl ArchiveDescriptor {
    /// Decodes the header in `bytes`, which holds the whole of the cabinet
    /// file at `path`.
    pub(crate) fn parse(
        path: &Path,
        bytes: &[u8],
    ) -> Result<ArchiveDescriptor, HeaderError> {
        let preamble = Preamble::read(&mut Cursor::new(bytes))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let descriptor = ArchiveDescriptor {
            path: path.to_path_buf(),
            name,
            entry_count: preamble.num_files,
            entry_offset: preamble.first_file_offset,
            ordinal: preamble.set_index,
            set_id: preamble.set_id,
            previous: preamble
                .prev
                .map(|link| link.cabinet)
                .unwrap_or_default(),
            next: preamble.next.map(|link| link.cabinet).unwrap_or_default(),
        };
        tracing::debug!(
            path = %descriptor.path.display(),
            entries = descriptor.entry_count,
            ordinal = descriptor.ordinal,
            previous = %descriptor.previous,
            next = %descriptor.next,
            "parsed cabinet header"
        );
        Ok(descriptor)
    }

    /// Returns the absolute path of the cabinet file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name of the cabinet.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of file records in this cabinet.
    pub fn entry_count(&self) -> u16 {
        self.entry_count
    }

    /// Returns the byte offset of the first file record.
    pub fn entry_offset(&self) -> u32 {
        self.entry_offset
    }

    /// Returns this cabinet's (zero-based) index within its set.
    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    /// Returns the set ID shared by every cabinet in the set.
    pub fn set_id(&self) -> u16 {
        self.set_id
    }

    /// Returns the file name of the previous cabinet, or `""` if none.
    pub fn previous(&self) -> &str {
        &self.previous
    }

    /// Returns the file name of the next cabinet, or `""` if none.
    pub fn next(&self) -> &str {
        &self.next
    }
}

/// One file record reduced to what size accounting needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct EntrySize {
    pub name: Vec<u8>,
    pub size: u32,
}

/// Re-reads the file records of the cabinet in `bytes`, starting at the
/// descriptor's entry offset.
pub(crate) fn scan_entries(
    descriptor: &ArchiveDescriptor,
    bytes: &[u8],
) -> io::Result<Vec<EntrySize>> {
    let mut reader = Cursor::new(bytes);
    reader.seek(SeekFrom::Start(descriptor.entry_offset as u64))?;
    let mut entries = Vec::with_capacity(descriptor.entry_count as usize);
    for _ in 0..descriptor.entry_count {
        let size = reader.read_u32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(consts::FILE_RECORD_SKIP))?;
        let name = read_null_terminated_bytes(&mut reader)?;
        entries.push(EntrySize { name, size });
    }
    Ok(entries)
}
