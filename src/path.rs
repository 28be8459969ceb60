//! Destination paths for cabinet entries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Splits a stored entry name into path segments.  Both `\` and `/`
/// separate segments.
///
/// Names that could resolve outside the destination (empty, `.` or `..`
/// segments, or a drive or stream prefix) are rejected.
pub fn split_entry_name(name: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = name.split(['\\', '/']).collect();
    let escapes = segments.iter().any(|segment| {
        segment.is_empty()
            || *segment == "."
            || *segment == ".."
            || segment.contains(':')
    });
    if escapes {
        return Err(Error::destination(name, "entry escapes destination"));
    }
    Ok(segments)
}

/// Joins `segments` onto `root`, one separator between each.
pub fn join_segments<S: AsRef<str>>(root: &Path, segments: &[S]) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in segments {
        path.push(segment.as_ref());
    }
    path
}

/// Returns the directory that will hold the file named by `segments`.
pub fn parent_dir<S: AsRef<str>>(root: &Path, segments: &[S]) -> PathBuf {
    match segments.split_last() {
        Some((_, dirs)) => join_segments(root, dirs),
        None => root.to_path_buf(),
    }
}

/// Creates `path` and any missing ancestors, outermost first.  A directory
/// that already exists is not an error.  Returns the directories that were
/// actually created.
pub fn create_dir_tree(path: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() || dir.is_dir() {
            break;
        }
        missing.push(dir);
        current = dir.parent();
    }
    let mut created = Vec::with_capacity(missing.len());
    for dir in missing.into_iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => {
                tracing::trace!(dir = %dir.display(), "created directory");
                created.push(dir.to_path_buf());
            }
            Err(error)
                if error.kind() == io::ErrorKind::AlreadyExists
                    && dir.is_dir() => {}
            Err(error) => return Err(Error::create_dir(dir, error)),
        }
    }
    Ok(created)
}
