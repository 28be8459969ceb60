//! Resolution of a cabinet set from any one of its members.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoOp, Result};
use crate::header::{scan_entries, ArchiveDescriptor, HeaderError};
use crate::mmap::MappedArchive;

/// The cabinets of one set, in order, with the set's total uncompressed
/// size.
#[derive(Clone, Debug)]
pub struct ArchiveSet {
    members: Vec<ArchiveDescriptor>,
    total_size: u64,
}

impl ArchiveSet {
    /// Resolves the set containing the cabinet at `path`.
    ///
    /// Walks `previous` links back to the first cabinet, then `next` links
    /// forward, adding up the declared size of every file.  A file that
    /// spans cabinets is listed in each of them but counted once.
    ///
    /// Nothing is written and no data block is read.  Starting from any
    /// member of a set gives the same result.
    pub fn resolve<P: AsRef<Path>>(path: P) -> Result<ArchiveSet> {
        let path = path.as_ref();
        let start = fs::canonicalize(path)
            .map_err(|error| Error::io(IoOp::Open, path, error))?;
        let mut resolver = Resolver::default();
        let first = resolver.find_first(&start)?;
        resolver.walk_forward(first)
    }

    /// Returns the cabinets of the set, first to last.
    pub fn members(&self) -> &[ArchiveDescriptor] {
        &self.members
    }

    /// Returns the first cabinet of the set (the one with no previous
    /// cabinet).
    pub fn first(&self) -> &ArchiveDescriptor {
        &self.members[0]
    }

    /// Returns the path of the first cabinet of the set.
    pub fn first_path(&self) -> &Path {
        self.first().path()
    }

    /// Returns the total uncompressed size of every file in the set.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns the number of cabinets in the set.
    pub fn cabinet_count(&self) -> usize {
        self.members.len()
    }
}

/// Descriptors parsed so far, keyed by canonical path.  Lives for one
/// resolution.
#[derive(Default)]
struct Resolver {
    cache: HashMap<PathBuf, ArchiveDescriptor>,
}

impl Resolver {
    fn describe(&mut self, path: &Path) -> Result<ArchiveDescriptor> {
        if let Some(descriptor) = self.cache.get(path) {
            return Ok(descriptor.clone());
        }
        let mapped = MappedArchive::open(path)
            .map_err(|error| Error::io(IoOp::Open, path, error))?;
        let descriptor = ArchiveDescriptor::parse(path, mapped.bytes())
            .map_err(|error| format_error(path, error))?;
        self.cache.insert(path.to_path_buf(), descriptor.clone());
        Ok(descriptor)
    }

    fn find_first(&mut self, start: &Path) -> Result<PathBuf> {
        let mut current = start.to_path_buf();
        let mut seen = HashSet::new();
        loop {
            seen.insert(current.clone());
            let descriptor = if current == start {
                self.describe(&current)?
            } else {
                self.describe(&current).map_err(|e| linked(&current, e))?
            };
            if descriptor.previous().is_empty() {
                tracing::debug!(
                    first = %current.display(),
                    "found first cabinet"
                );
                return Ok(current);
            }
            let previous = link_path(&current, descriptor.previous())?;
            tracing::debug!(
                from = %current.display(),
                to = %previous.display(),
                "following previous link"
            );
            if seen.contains(&previous) {
                return Err(cycle(&previous));
            }
            current = previous;
        }
    }

    fn walk_forward(&mut self, first: PathBuf) -> Result<ArchiveSet> {
        let mut members = Vec::new();
        let mut counted: HashSet<Vec<u8>> = HashSet::new();
        let mut seen = HashSet::new();
        let mut total_size = 0u64;
        let mut current = first;
        loop {
            seen.insert(current.clone());
            let wrap = |e: Error| {
                if members.is_empty() {
                    e
                } else {
                    linked(&current, e)
                }
            };
            let descriptor = self.describe(&current).map_err(wrap)?;
            let entries = MappedArchive::open(&current)
                .map_err(|error| Error::io(IoOp::Read, &current, error))
                .and_then(|mapped| {
                    scan_entries(&descriptor, mapped.bytes()).map_err(|e| {
                        Error::Format {
                            path: current.clone(),
                            reason: format!("cannot read file records: {}", e),
                        }
                    })
                })
                .map_err(wrap)?;
            for entry in entries {
                if counted.insert(entry.name) {
                    total_size += entry.size as u64;
                }
            }
            tracing::debug!(
                cabinet = %current.display(),
                running_total = total_size,
                "counted cabinet"
            );
            let next = descriptor.next().to_string();
            members.push(descriptor);
            if next.is_empty() {
                break;
            }
            let next = link_path(&current, &next)?;
            if seen.contains(&next) {
                return Err(cycle(&next));
            }
            current = next;
        }
        Ok(ArchiveSet { members, total_size })
    }
}

/// Composes a linked cabinet's name with the directory of the cabinet
/// that names it.
fn link_path(from: &Path, name: &str) -> Result<PathBuf> {
    let dir = from.parent().unwrap_or_else(|| Path::new(""));
    let joined = dir.join(name);
    fs::canonicalize(&joined).map_err(|error| {
        linked(&joined, Error::io(IoOp::Open, &joined, error))
    })
}

fn linked(link: &Path, source: Error) -> Error {
    Error::ChainResolution {
        link: link.to_path_buf(),
        source: Box::new(source),
    }
}

fn cycle(link: &Path) -> Error {
    let source = Error::Format {
        path: link.to_path_buf(),
        reason: "cabinet set links form a cycle".to_string(),
    };
    linked(link, source)
}

fn format_error(path: &Path, error: HeaderError) -> Error {
    let reason = match error {
        HeaderError::Signature => "not a cabinet file".to_string(),
        HeaderError::Version(major, minor) => {
            format!("unsupported cabinet version {}.{}", major, minor)
        }
        HeaderError::Io(error) => {
            format!("malformed cabinet header: {}", error)
        }
    };
    Error::Format { path: path.to_path_buf(), reason }
}
