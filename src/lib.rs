//! A library for resolving and extracting sets of [Windows
//! cabinet](https://en.wikipedia.org/wiki/Cabinet_(file_format)) (CAB)
//! files, including files that span several cabinets.
//!
//! The usual entry point is [`extract`]:
//!
//! ```no_run
//! use cabset::{extract, ExtractOptions, ProgressEvent};
//!
//! let mut report = |event: &ProgressEvent| {
//!     println!("{}% {}", event.percent_complete, event.cabinet);
//! };
//! let manifest = extract(
//!     "disk1.cab",
//!     "out",
//!     &ExtractOptions::default(),
//!     &mut report,
//! )?;
//! println!("{} files", manifest.file_count());
//! # Ok::<(), cabset::Error>(())
//! ```
//!
//! [`ArchiveSet::resolve`] finds a set's first cabinet and total size
//! without extracting anything, and [`Decoder`] exposes the lower-level
//! callback interface the extractor is built on.

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod cabinet;
mod chain;
mod checksum;
mod consts;
mod ctype;
mod datetime;
mod decoder;
mod error;
mod extract;
mod file;
mod folder;
mod header;
mod manifest;
mod metadata;
mod mmap;
mod mszip;
mod options;
mod path;
mod progress;
mod string;

pub use crate::cabinet::Cabinet;
pub use crate::chain::ArchiveSet;
pub use crate::ctype::CompressionType;
pub use crate::decoder::{
    DecodeError, Decoder, DecoderOp, Host, Notification, OpenMode, Reply,
};
pub use crate::error::{Error, IoOp, Result, GENERIC_IO_ERROR};
pub use crate::extract::extract;
pub use crate::file::{FileEntry, FolderRef};
pub use crate::folder::FolderEntry;
pub use crate::header::{ArchiveDescriptor, CabinetLink};
pub use crate::manifest::{EntryKind, Manifest, ManifestEntry};
pub use crate::options::ExtractOptions;
pub use crate::path::{
    create_dir_tree, join_segments, parent_dir, split_entry_name,
};
pub use crate::progress::{NullSink, ProgressEvent, ProgressSink, RecordKind};
