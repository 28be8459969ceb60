use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use time::PrimitiveDateTime;

use crate::consts;
use crate::datetime::datetime_from_bits;
use crate::string::read_null_terminated_string;

/// Where a file's data lives relative to the cabinet that lists it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FolderRef {
    /// Entirely within the folder with this index.
    Index(u16),
    /// Starts in a previous cabinet and ends in this one (in the first
    /// folder).
    ContinuedFromPrev,
    /// Starts in this cabinet (in the last folder) and ends in a later one.
    ContinuedToNext,
    /// Starts in a previous cabinet and ends in a later one.
    ContinuedPrevAndNext,
}

impl FolderRef {
    fn from_bits(bits: u16) -> FolderRef {
        match bits {
            consts::IFOLD_CONTINUED_FROM_PREV => FolderRef::ContinuedFromPrev,
            consts::IFOLD_CONTINUED_TO_NEXT => FolderRef::ContinuedToNext,
            consts::IFOLD_CONTINUED_PREV_AND_NEXT => {
                FolderRef::ContinuedPrevAndNext
            }
            index => FolderRef::Index(index),
        }
    }

    /// Returns true if the file's data began in an earlier cabinet.
    pub fn is_from_prev(self) -> bool {
        matches!(
            self,
            FolderRef::ContinuedFromPrev | FolderRef::ContinuedPrevAndNext
        )
    }

    /// Returns true if the file's data runs on into a later cabinet.
    pub fn is_to_next(self) -> bool {
        matches!(
            self,
            FolderRef::ContinuedToNext | FolderRef::ContinuedPrevAndNext
        )
    }

    /// Resolves to a folder index in a cabinet with `num_folders` folders.
    /// Files continued from an earlier cabinet live in its first folder;
    /// files continued into a later one live in its last.
    pub fn resolve(self, num_folders: usize) -> usize {
        match self {
            FolderRef::Index(index) => index as usize,
            FolderRef::ContinuedFromPrev
            | FolderRef::ContinuedPrevAndNext => 0,
            FolderRef::ContinuedToNext => num_folders.saturating_sub(1),
        }
    }
}

/// Metadata about one file stored in a cabinet.
#[derive(Debug, Clone)]
pub struct FileEntry {
    name: String,
    date: u16,
    time: u16,
    uncompressed_size: u32,
    attributes: u16,
    pub(crate) folder: FolderRef,
    pub(crate) uncompressed_offset: u32,
}

impl FileEntry {
    /// Returns the name of file, exactly as stored (path segments may be
    /// separated with `\` or `/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw DOS date and time words.
    pub fn dos_datetime(&self) -> (u16, u16) {
        (self.date, self.time)
    }

    /// Returns the datetime for this file, or [`None`] if the stored
    /// date/time was not valid.
    pub fn datetime(&self) -> Option<PrimitiveDateTime> {
        datetime_from_bits(self.date, self.time)
    }

    /// Returns the total size of the file when decompressed, in bytes.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Returns the offset of this file's data within its (possibly
    /// multi-cabinet) folder.
    pub fn uncompressed_offset(&self) -> u32 {
        self.uncompressed_offset
    }

    /// Returns the folder this file's data lives in.
    pub fn folder(&self) -> FolderRef {
        self.folder
    }

    /// Returns the raw attribute word.
    pub fn attributes(&self) -> u16 {
        self.attributes
    }

    /// Returns true if this file has the "read-only" attribute set.
    pub fn is_read_only(&self) -> bool {
        (self.attributes & consts::ATTR_READ_ONLY) != 0
    }

    /// Returns true if this file has the "hidden" attribute set.
    pub fn is_hidden(&self) -> bool {
        (self.attributes & consts::ATTR_HIDDEN) != 0
    }

    /// Returns true if this file has the "system file" attribute set.
    pub fn is_system(&self) -> bool {
        (self.attributes & consts::ATTR_SYSTEM) != 0
    }

    /// Returns true if this file has the "archive" (modified since last
    /// backup) attribute set.
    pub fn is_archive(&self) -> bool {
        (self.attributes & consts::ATTR_ARCH) != 0
    }

    /// Returns true if this file has the "execute after extraction" attribute
    /// set.
    pub fn is_exec(&self) -> bool {
        (self.attributes & consts::ATTR_EXEC) != 0
    }

    /// Returns true if this file has the "name is UTF" attribute set.
    pub fn is_name_utf(&self) -> bool {
        (self.attributes & consts::ATTR_NAME_IS_UTF) != 0
    }

    /// Returns true if the stored date/time is already UTC.
    pub fn is_time_utc(&self) -> bool {
        (self.attributes & consts::ATTR_TIME_IS_UTC) != 0
    }
}

pub(crate) fn parse_file_entry<R: Read>(
    mut reader: R,
) -> io::Result<FileEntry> {
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let uncompressed_offset = reader.read_u32::<LittleEndian>()?;
    let folder = FolderRef::from_bits(reader.read_u16::<LittleEndian>()?);
    let date = reader.read_u16::<LittleEndian>()?;
    let time = reader.read_u16::<LittleEndian>()?;
    let attributes = reader.read_u16::<LittleEndian>()?;
    let is_utf8 = (attributes & consts::ATTR_NAME_IS_UTF) != 0;
    let name = read_null_terminated_string(&mut reader, is_utf8)?;
    Ok(FileEntry {
        name,
        date,
        time,
        uncompressed_size,
        attributes,
        folder,
        uncompressed_offset,
    })
}
