//! Listings of extracted (or existing) directory trees.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, IoOp, Result};

/// Whether a [`ManifestEntry`] is a file or a directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// One file or directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    /// File or directory.
    pub kind: EntryKind,
    /// The last path segment.
    pub name: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Path relative to the root of the tree.
    pub relative_path: PathBuf,
    /// Length in bytes; 0 for directories.
    pub length: u64,
}

impl ManifestEntry {
    pub(crate) fn directory(root: &Path, path: &Path) -> ManifestEntry {
        ManifestEntry::new(EntryKind::Directory, root, path, 0)
    }

    pub(crate) fn file(
        root: &Path,
        path: &Path,
        length: u64,
    ) -> ManifestEntry {
        ManifestEntry::new(EntryKind::File, root, path, length)
    }

    fn new(kind: EntryKind, root: &Path, path: &Path, length: u64) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_path =
            path.strip_prefix(root).unwrap_or(path).to_path_buf();
        ManifestEntry {
            kind,
            name,
            path: path.to_path_buf(),
            relative_path,
            length,
        }
    }
}

/// An ordered list of entries with running totals.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    directory_count: usize,
    file_count: usize,
    total_length: u64,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Manifest {
        Manifest::default()
    }

    /// Lists everything below `root` (not `root` itself), in file name
    /// order within each directory.
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Manifest> {
        let root = root.as_ref();
        let mut manifest = Manifest::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                let path = error.path().unwrap_or(root).to_path_buf();
                Error::io(IoOp::Read, path, io::Error::from(error))
            })?;
            if entry.file_type().is_dir() {
                manifest.push(ManifestEntry::directory(root, entry.path()));
            } else {
                let metadata = entry.metadata().map_err(|error| {
                    Error::io(IoOp::Read, entry.path(), io::Error::from(error))
                })?;
                let length = metadata.len();
                manifest.push(ManifestEntry::file(root, entry.path(), length));
            }
        }
        Ok(manifest)
    }

    /// Appends an entry and updates the totals.
    pub fn push(&mut self, entry: ManifestEntry) {
        match entry.kind {
            EntryKind::File => {
                self.file_count += 1;
                self.total_length += entry.length;
            }
            EntryKind::Directory => self.directory_count += 1,
        }
        self.entries.push(entry);
    }

    /// Returns the entries in the order they were added.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Returns the number of directory entries.
    pub fn directory_count(&self) -> usize {
        self.directory_count
    }

    /// Returns the number of file entries.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Returns the summed length of all file entries.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{EntryKind, Manifest, ManifestEntry};

    #[test]
    fn totals_follow_pushes() {
        let root = Path::new("/out");
        let mut manifest = Manifest::new();
        manifest.push(ManifestEntry::directory(root, &root.join("docs")));
        manifest.push(ManifestEntry::file(root, &root.join("docs/a.txt"), 12));
        manifest.push(ManifestEntry::file(root, &root.join("b.txt"), 30));
        assert_eq!(manifest.directory_count(), 1);
        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.total_length(), 42);
        let entry = &manifest.entries()[1];
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.relative_path, Path::new("docs/a.txt"));
    }

    #[test]
    fn scan_lists_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("x.bin"), [0u8; 17]).unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let manifest = Manifest::scan(dir.path()).unwrap();
        let kinds: Vec<(EntryKind, &str)> = manifest
            .entries()
            .iter()
            .map(|entry| (entry.kind, entry.name.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EntryKind::File, "a.txt"),
                (EntryKind::Directory, "sub"),
                (EntryKind::File, "x.bin"),
            ]
        );
        assert_eq!(manifest.total_length(), 22);
    }
}
