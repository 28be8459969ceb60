use std::io::{self, Read, Seek, SeekFrom};

use crate::file::{parse_file_entry, FileEntry};
use crate::folder::{parse_folder_entry, FolderEntry};
use crate::header::{CabinetLink, HeaderError, Preamble};

/// The decoded tables of one cabinet file: header, folders and files.
#[derive(Clone, Debug)]
pub struct Cabinet {
    set_id: u16,
    set_index: u16,
    data_reserve_size: u8,
    reserve_data: Vec<u8>,
    prev: Option<CabinetLink>,
    next: Option<CabinetLink>,
    folders: Vec<FolderEntry>,
    files: Vec<FileEntry>,
}

impl Cabinet {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
    ) -> Result<Cabinet, HeaderError> {
        let preamble = Preamble::read(reader)?;
        let mut folders = Vec::with_capacity(preamble.num_folders as usize);
        for _ in 0..preamble.num_folders {
            let entry = parse_folder_entry(
                &mut *reader,
                preamble.folder_reserve_size as usize,
            )?;
            folders.push(entry);
        }
        reader.seek(SeekFrom::Start(preamble.first_file_offset as u64))?;
        let mut files = Vec::with_capacity(preamble.num_files as usize);
        for _ in 0..preamble.num_files {
            let entry = parse_file_entry(&mut *reader)?;
            if entry.folder.resolve(folders.len()) >= folders.len() {
                let message = format!(
                    "File entry {:?} folder index out of bounds",
                    entry.name()
                );
                return Err(io::Error::new(io::ErrorKind::InvalidData, message)
                    .into());
            }
            files.push(entry);
        }
        Ok(Cabinet {
            set_id: preamble.set_id,
            set_index: preamble.set_index,
            data_reserve_size: preamble.data_reserve_size,
            reserve_data: preamble.header_reserve,
            prev: preamble.prev,
            next: preamble.next,
            folders,
            files,
        })
    }

    /// Returns the cabinet set ID for this cabinet (an arbitrary number used
    /// to group together a set of cabinets).
    pub fn set_id(&self) -> u16 {
        self.set_id
    }

    /// Returns this cabinet's (zero-based) index within its cabinet set.
    pub fn set_index(&self) -> u16 {
        self.set_index
    }

    /// Returns the application-defined reserve data stored in the cabinet
    /// header.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    /// Returns the link to the previous cabinet in the set, if any.
    pub fn prev(&self) -> Option<&CabinetLink> {
        self.prev.as_ref()
    }

    /// Returns the link to the next cabinet in the set, if any.
    pub fn next(&self) -> Option<&CabinetLink> {
        self.next.as_ref()
    }

    /// Returns the folder entries in this cabinet.
    pub fn folders(&self) -> &[FolderEntry] {
        &self.folders
    }

    /// Returns the file entries in this cabinet, in stored order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub(crate) fn data_reserve_size(&self) -> usize {
        self.data_reserve_size as usize
    }

    /// Returns the files whose data lives in the given folder, in stored
    /// order.
    pub(crate) fn files_in_folder(
        &self,
        index: usize,
    ) -> impl Iterator<Item = &FileEntry> + '_ {
        let num_folders = self.folders.len();
        self.files
            .iter()
            .filter(move |file| file.folder.resolve(num_folders) == index)
    }

    /// True if the first folder carries on a folder begun in the previous
    /// cabinet.
    pub(crate) fn first_folder_is_continued(&self) -> bool {
        self.files.iter().any(|file| file.folder.is_from_prev())
    }

    /// True if the last folder runs on into the next cabinet.
    pub(crate) fn last_folder_continues(&self) -> bool {
        self.next.is_some() && self.files.iter().any(|f| f.folder.is_to_next())
    }
}
