//! Writes cabinet sets for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::{Compress, Compression, FlushCompress};

// 2018-01-06 15:19:42
pub const DEFAULT_DATE: u16 = 0x4c26;
pub const DEFAULT_TIME: u16 = 0x7a75;
pub const ATTR_READ_ONLY: u16 = 0x01;
pub const ATTR_ARCH: u16 = 0x20;
pub const ATTR_NAME_IS_UTF: u16 = 0x80;
pub const ATTR_TIME_IS_UTC: u16 = 0x100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    None,
    MsZip,
}

#[derive(Clone, Debug)]
pub struct TestFile {
    pub name: String,
    pub data: Vec<u8>,
    pub date: u16,
    pub time: u16,
    pub attributes: u16,
}

impl TestFile {
    pub fn new(name: &str, data: impl Into<Vec<u8>>) -> TestFile {
        TestFile {
            name: name.to_string(),
            data: data.into(),
            date: DEFAULT_DATE,
            time: DEFAULT_TIME,
            attributes: ATTR_ARCH,
        }
    }

    pub fn attributes(mut self, attributes: u16) -> TestFile {
        self.attributes = attributes;
        self
    }
}

#[derive(Clone, Debug)]
struct Reserve {
    header: Vec<u8>,
    folder: u8,
    data: u8,
}

/// Builds a set of cabinets holding the given folders, in order.  Data is
/// cut into blocks of `block_size` bytes and every cabinet holds
/// `blocks_per_cabinet` data blocks (the last one may hold fewer).
pub struct SetBuilder {
    prefix: String,
    folders: Vec<(Method, Vec<TestFile>)>,
    block_size: usize,
    blocks_per_cabinet: usize,
    split_blocks: bool,
    checksums: bool,
    reserve: Option<Reserve>,
    set_id: u16,
}

struct Block {
    folder: usize,
    payload: Vec<u8>,
    uncompressed: Vec<u8>,
    offset: u64,
}

struct Physical {
    payload: Vec<u8>,
    uncompressed_size: u16,
}

impl SetBuilder {
    pub fn new(prefix: &str) -> SetBuilder {
        SetBuilder {
            prefix: prefix.to_string(),
            folders: Vec::new(),
            block_size: 0x8000,
            blocks_per_cabinet: usize::MAX,
            split_blocks: false,
            checksums: true,
            reserve: None,
            set_id: 0x5ca1,
        }
    }

    pub fn folder(mut self, method: Method, files: Vec<TestFile>) -> Self {
        self.folders.push((method, files));
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        assert!(size > 0 && size <= 0x8000);
        self.block_size = size;
        self
    }

    pub fn blocks_per_cabinet(mut self, count: usize) -> Self {
        self.blocks_per_cabinet = count;
        self
    }

    pub fn split_blocks(mut self, split: bool) -> Self {
        self.split_blocks = split;
        self
    }

    pub fn checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn reserve(mut self, header: &[u8], folder: u8, data: u8) -> Self {
        self.reserve = Some(Reserve { header: header.to_vec(), folder, data });
        self
    }

    pub fn cabinet_name(&self, index: usize) -> String {
        format!("{}{}.cab", self.prefix, index + 1)
    }

    /// Writes the cabinets into `dir` and returns their paths.
    pub fn write(&self, dir: &Path) -> Vec<PathBuf> {
        self.build()
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| {
                let path = dir.join(self.cabinet_name(index));
                fs::write(&path, bytes).unwrap();
                path
            })
            .collect()
    }

    /// Returns the bytes of each cabinet.
    pub fn build(&self) -> Vec<Vec<u8>> {
        let blocks = self.blocks();
        let num_cabinets =
            blocks.len().div_ceil(self.blocks_per_cabinet).max(1);

        // Physical placement and the cabinet each block is decoded in.
        let mut physical: Vec<Vec<(usize, Physical)>> =
            (0..num_cabinets).map(|_| Vec::new()).collect();
        let mut decoded_in = vec![0; blocks.len()];
        for (index, block) in blocks.iter().enumerate() {
            let cabinet = index / self.blocks_per_cabinet;
            let last_in_cabinet = (index + 1) % self.blocks_per_cabinet == 0;
            let split = self.split_blocks
                && last_in_cabinet
                && cabinet + 1 < num_cabinets
                && blocks.get(index + 1).map(|b| b.folder)
                    == Some(block.folder)
                && block.payload.len() >= 2;
            let size = block.uncompressed.len() as u16;
            if split {
                let half = block.payload.len() / 2;
                physical[cabinet].push((
                    block.folder,
                    Physical {
                        payload: block.payload[..half].to_vec(),
                        uncompressed_size: 0,
                    },
                ));
                physical[cabinet + 1].push((
                    block.folder,
                    Physical {
                        payload: block.payload[half..].to_vec(),
                        uncompressed_size: size,
                    },
                ));
                decoded_in[index] = cabinet + 1;
            } else {
                physical[cabinet].push((
                    block.folder,
                    Physical {
                        payload: block.payload.clone(),
                        uncompressed_size: size,
                    },
                ));
                decoded_in[index] = cabinet;
            }
        }

        (0..num_cabinets)
            .map(|cabinet| {
                self.serialize(
                    cabinet,
                    num_cabinets,
                    &blocks,
                    &decoded_in,
                    &physical,
                )
            })
            .collect()
    }

    fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        for (folder, (method, files)) in self.folders.iter().enumerate() {
            let data: Vec<u8> = files
                .iter()
                .flat_map(|file| file.data.iter().copied())
                .collect();
            let chunks: Vec<&[u8]> = if data.is_empty() {
                vec![&data[..]]
            } else {
                data.chunks(self.block_size).collect()
            };
            let mut compressor = Compress::new(Compression::best(), false);
            let mut offset = 0u64;
            for (index, chunk) in chunks.iter().enumerate() {
                let payload = match method {
                    Method::None => chunk.to_vec(),
                    Method::MsZip => {
                        let is_last = index + 1 == chunks.len();
                        mszip_block(&mut compressor, chunk, is_last)
                    }
                };
                blocks.push(Block {
                    folder,
                    payload,
                    uncompressed: chunk.to_vec(),
                    offset,
                });
                offset += chunk.len() as u64;
            }
        }
        blocks
    }

    fn serialize(
        &self,
        cabinet: usize,
        num_cabinets: usize,
        blocks: &[Block],
        decoded_in: &[usize],
        physical: &[Vec<(usize, Physical)>],
    ) -> Vec<u8> {
        // Folders with data in this cabinet, in order.
        let mut folders: Vec<usize> = Vec::new();
        for (folder, _) in &physical[cabinet] {
            if folders.last() != Some(folder) {
                folders.push(*folder);
            }
        }
        let has_blocks_in = |folder: usize, range: std::ops::Range<usize>| {
            range
                .into_iter()
                .any(|c| physical[c].iter().any(|(f, _)| *f == folder))
        };

        // File records.
        let mut records = Vec::new();
        let mut num_files = 0u16;
        for (local, &folder) in folders.iter().enumerate() {
            let from_prev = has_blocks_in(folder, 0..cabinet);
            let to_next = has_blocks_in(folder, cabinet + 1..num_cabinets);
            let (lo, hi) = decoded_range(blocks, decoded_in, folder, cabinet);
            let folder_total = folder_length(blocks, folder);
            let mut crossing = false;
            let mut offset = 0u64;
            for file in &self.folders[folder].1 {
                let start = offset;
                let end = start + file.data.len() as u64;
                offset = end;
                let starts_here = (start >= lo && start < hi)
                    || (start == folder_total && start >= lo && !to_next);
                let starts_before = from_prev && start < lo;
                let ends_after = to_next && end > hi;
                let listed = starts_here || (starts_before && end > lo);
                if !listed {
                    continue;
                }
                if ends_after {
                    crossing = true;
                }
                let index = match (starts_before, ends_after) {
                    (true, true) => 0xffff,
                    (true, false) => 0xfffd,
                    (false, true) => 0xfffe,
                    (false, false) => local as u16,
                };
                write_file_record(&mut records, file, start as u32, index);
                num_files += 1;
            }
            if to_next && local + 1 == folders.len() {
                assert!(
                    crossing,
                    "no file crosses the end of {}; adjust the test sizes",
                    self.cabinet_name(cabinet)
                );
            }
        }

        // Header, links and folder records, with placeholders for offsets.
        let mut flags = 0u16;
        let mut links = Vec::new();
        if cabinet > 0 {
            flags |= 0x1;
            links.extend_from_slice(self.cabinet_name(cabinet - 1).as_bytes());
            links.push(0);
            links.extend_from_slice(format!("Disk {}", cabinet).as_bytes());
            links.push(0);
        }
        if cabinet + 1 < num_cabinets {
            flags |= 0x2;
            links.extend_from_slice(self.cabinet_name(cabinet + 1).as_bytes());
            links.push(0);
            let disk = format!("Disk {}", cabinet + 2);
            links.extend_from_slice(disk.as_bytes());
            links.push(0);
        }
        let mut reserve_fields = Vec::new();
        let (folder_reserve, data_reserve) = match self.reserve {
            Some(ref reserve) => {
                flags |= 0x4;
                reserve_fields
                    .write_u16::<LittleEndian>(reserve.header.len() as u16)
                    .unwrap();
                reserve_fields.push(reserve.folder);
                reserve_fields.push(reserve.data);
                reserve_fields.extend_from_slice(&reserve.header);
                (reserve.folder as usize, reserve.data as usize)
            }
            None => (0, 0),
        };
        let folders_offset = 36 + reserve_fields.len() + links.len();
        let files_offset =
            folders_offset + folders.len() * (8 + folder_reserve);
        let data_offset = files_offset + records.len();

        let mut data = Vec::new();
        let mut folder_records = Vec::new();
        for &folder in &folders {
            let first = data_offset + data.len();
            let mut count = 0u16;
            let blocks_here =
                physical[cabinet].iter().filter(|(f, _)| *f == folder);
            for (_, block) in blocks_here {
                let reserve = vec![0xbb; data_reserve];
                let compressed = block.payload.len() as u16;
                let checksum = if self.checksums {
                    data_block_checksum(
                        &reserve,
                        &block.payload,
                        compressed,
                        block.uncompressed_size,
                    )
                } else {
                    0
                };
                data.write_u32::<LittleEndian>(checksum).unwrap();
                data.write_u16::<LittleEndian>(compressed).unwrap();
                data.write_u16::<LittleEndian>(block.uncompressed_size)
                    .unwrap();
                data.extend_from_slice(&reserve);
                data.extend_from_slice(&block.payload);
                count += 1;
            }
            let ctype = match self.folders[folder].0 {
                Method::None => 0u16,
                Method::MsZip => 1u16,
            };
            folder_records.write_u32::<LittleEndian>(first as u32).unwrap();
            folder_records.write_u16::<LittleEndian>(count).unwrap();
            folder_records.write_u16::<LittleEndian>(ctype).unwrap();
            folder_records
                .extend(std::iter::repeat(0xaa).take(folder_reserve));
        }

        let total = data_offset + data.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"MSCF");
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(total as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(files_offset as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.push(3);
        out.push(1);
        out.write_u16::<LittleEndian>(folders.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(num_files).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(self.set_id).unwrap();
        out.write_u16::<LittleEndian>(cabinet as u16).unwrap();
        out.extend_from_slice(&reserve_fields);
        out.extend_from_slice(&links);
        out.extend_from_slice(&folder_records);
        out.extend_from_slice(&records);
        out.extend_from_slice(&data);
        assert_eq!(out.len(), total);
        out
    }
}

fn decoded_range(
    blocks: &[Block],
    decoded_in: &[usize],
    folder: usize,
    cabinet: usize,
) -> (u64, u64) {
    let mut lo = None;
    let mut hi = 0u64;
    for (index, block) in blocks.iter().enumerate() {
        if block.folder != folder {
            continue;
        }
        let end = block.offset + block.uncompressed.len() as u64;
        if decoded_in[index] < cabinet {
            hi = end;
        } else if decoded_in[index] == cabinet {
            lo.get_or_insert(block.offset);
            hi = end;
        } else if lo.is_none() {
            lo = Some(block.offset);
            hi = block.offset;
        }
    }
    (lo.unwrap_or(hi), hi)
}

fn folder_length(blocks: &[Block], folder: usize) -> u64 {
    blocks
        .iter()
        .filter(|block| block.folder == folder)
        .map(|block| block.uncompressed.len() as u64)
        .sum()
}

fn write_file_record(
    out: &mut Vec<u8>,
    file: &TestFile,
    offset: u32,
    folder: u16,
) {
    let mut attributes = file.attributes;
    if !file.name.is_ascii() {
        attributes |= ATTR_NAME_IS_UTF;
    }
    out.write_u32::<LittleEndian>(file.data.len() as u32).unwrap();
    out.write_u32::<LittleEndian>(offset).unwrap();
    out.write_u16::<LittleEndian>(folder).unwrap();
    out.write_u16::<LittleEndian>(file.date).unwrap();
    out.write_u16::<LittleEndian>(file.time).unwrap();
    out.write_u16::<LittleEndian>(attributes).unwrap();
    out.extend_from_slice(file.name.as_bytes());
    out.push(0);
}

fn mszip_block(
    compressor: &mut Compress,
    data: &[u8],
    is_last: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(0x10000);
    out.extend_from_slice(b"CK");
    let flush =
        if is_last { FlushCompress::Finish } else { FlushCompress::Sync };
    compressor.compress_vec(data, &mut out, flush).unwrap();
    if !is_last {
        // An empty final block, so each block is a complete stream.
        out.extend_from_slice(&[0x03, 0x00]);
    }
    out
}

fn checksum(data: &[u8], seed: u32) -> u32 {
    let mut value = seed;
    let mut words = data.chunks_exact(4);
    for word in words.by_ref() {
        value ^= LittleEndian::read_u32(word);
    }
    let tail = words
        .remainder()
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
    value ^ tail
}

fn data_block_checksum(
    reserve: &[u8],
    data: &[u8],
    compressed: u16,
    uncompressed: u16,
) -> u32 {
    let mut header = Vec::new();
    header.extend_from_slice(&compressed.to_le_bytes());
    header.extend_from_slice(&uncompressed.to_le_bytes());
    header.extend_from_slice(reserve);
    checksum(&header, checksum(data, 0))
}

/// Deterministic pseudo-random bytes.
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Readable text of roughly `words` words.
pub fn text(words: usize) -> Vec<u8> {
    lipsum::lipsum(words).into_bytes()
}
