use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::checksum;
use crate::ctype::CompressionType;

/// Metadata about one folder in a cabinet.
#[derive(Clone, Debug)]
pub struct FolderEntry {
    first_data_block_offset: u32,
    num_data_blocks: u16,
    compression_type: CompressionType,
    reserve_data: Vec<u8>,
}

impl FolderEntry {
    /// Returns the scheme used to compress this folder's data.
    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    /// Returns the number of data blocks stored in this cabinet for this
    /// folder.
    pub fn num_data_blocks(&self) -> u16 {
        self.num_data_blocks
    }

    /// Returns the application-defined reserve data for this folder.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    pub(crate) fn first_data_block_offset(&self) -> u64 {
        self.first_data_block_offset as u64
    }
}

pub(crate) fn parse_folder_entry<R: Read>(
    mut reader: R,
    reserve_size: usize,
) -> io::Result<FolderEntry> {
    let first_data_offset = reader.read_u32::<LittleEndian>()?;
    let num_data_blocks = reader.read_u16::<LittleEndian>()?;
    let compression_bits = reader.read_u16::<LittleEndian>()?;
    let compression_type = CompressionType::from_bitfield(compression_bits)?;
    let mut reserve_data = vec![0u8; reserve_size];
    reader.read_exact(&mut reserve_data)?;
    Ok(FolderEntry {
        first_data_block_offset: first_data_offset,
        num_data_blocks,
        compression_type,
        reserve_data,
    })
}

/// One CFDATA record: header fields plus the still-compressed payload.
#[derive(Debug)]
pub(crate) struct DataBlock {
    pub checksum: u32,
    pub compressed_size: u16,
    pub uncompressed_size: u16,
    pub reserve_data: Vec<u8>,
    pub data: Vec<u8>,
}

impl DataBlock {
    pub(crate) fn read<R: Read>(
        mut reader: R,
        data_reserve_size: usize,
    ) -> io::Result<DataBlock> {
        let checksum = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u16::<LittleEndian>()?;
        let uncompressed_size = reader.read_u16::<LittleEndian>()?;
        let mut reserve_data = vec![0u8; data_reserve_size];
        reader.read_exact(&mut reserve_data)?;
        let mut data = vec![0u8; compressed_size as usize];
        reader.read_exact(&mut data)?;
        Ok(DataBlock {
            checksum,
            compressed_size,
            uncompressed_size,
            reserve_data,
            data,
        })
    }

    /// Size of the whole record on disk.
    pub(crate) fn record_len(&self) -> u64 {
        8 + self.reserve_data.len() as u64 + self.data.len() as u64
    }

    /// Checks the stored checksum, if there is one.
    pub(crate) fn verify(&self) -> io::Result<()> {
        if self.checksum == 0 {
            return Ok(());
        }
        let actual = checksum::data_block_checksum(
            &self.reserve_data,
            &self.data,
            self.compressed_size,
            self.uncompressed_size,
        );
        if actual != self.checksum {
            invalid_data!(
                "Checksum error in data block \
                 (expected {:08x}, actual {:08x})",
                self.checksum,
                actual
            );
        }
        Ok(())
    }

    /// True for the leading half of a block split across two cabinets.
    pub(crate) fn is_split(&self) -> bool {
        self.uncompressed_size == 0 && !self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{parse_folder_entry, DataBlock};
    use crate::ctype::CompressionType;

    #[test]
    fn parse_folder_with_reserve() {
        let mut reader =
            Cursor::new(b"\x43\0\0\0\x02\0\x01\0\xaa\xbb".to_vec());
        let folder = parse_folder_entry(&mut reader, 2).unwrap();
        assert_eq!(folder.first_data_block_offset(), 0x43);
        assert_eq!(folder.num_data_blocks(), 2);
        assert_eq!(folder.compression_type(), CompressionType::MsZip);
        assert_eq!(folder.reserve_data(), &[0xaa, 0xbb]);
    }

    #[test]
    fn read_and_verify_block() {
        let mut reader = Cursor::new(
            b"\x4c\x1a\x2e\x7f\x0e\0\x0e\0Hello, world!\n".to_vec(),
        );
        let block = DataBlock::read(&mut reader, 0).unwrap();
        assert_eq!(block.data, b"Hello, world!\n");
        assert_eq!(block.record_len(), 22);
        assert!(!block.is_split());
        block.verify().unwrap();
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let mut reader = Cursor::new(
            b"\x4c\x1a\x2e\x7f\x0e\0\x0e\0Hello, World!\n".to_vec(),
        );
        let block = DataBlock::read(&mut reader, 0).unwrap();
        let error = block.verify().unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn zero_uncompressed_size_marks_split_block() {
        let mut reader = Cursor::new(b"\0\0\0\0\x03\0\0\0abc".to_vec());
        let block = DataBlock::read(&mut reader, 0).unwrap();
        assert!(block.is_split());
    }
}
