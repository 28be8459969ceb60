use std::io;

use lzxd::Lzxd;

use crate::mszip::MsZipDecompressor;

const CTYPE_NONE: u16 = 0;
const CTYPE_MSZIP: u16 = 1;
const CTYPE_QUANTUM: u16 = 2;
const CTYPE_LZX: u16 = 3;

const QUANTUM_LEVEL_MIN: u16 = 1;
const QUANTUM_LEVEL_MAX: u16 = 7;
const QUANTUM_MEMORY_MIN: u16 = 10;
const QUANTUM_MEMORY_MAX: u16 = 21;

/// A scheme for compressing data within the cabinet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression.
    None,
    /// MSZIP compression.  MSZIP is described further in
    /// [MS-MCI](https://msdn.microsoft.com/en-us/library/cc483131.aspx).
    MsZip,
    /// Quantum compression with the given level and memory.  Recognized,
    /// but cannot be decoded.
    Quantum(u16, u16),
    /// LZX compression with the given window size.
    Lzx(lzxd::WindowSize),
}

impl CompressionType {
    /// Decodes the `typeCompress` field of a folder record.
    pub(crate) fn from_bitfield(bits: u16) -> io::Result<CompressionType> {
        match bits & 0x000f {
            CTYPE_NONE => Ok(CompressionType::None),
            CTYPE_MSZIP => Ok(CompressionType::MsZip),
            CTYPE_QUANTUM => {
                let level = (bits >> 4) & 0xf;
                let memory = (bits >> 8) & 0x1f;
                if !(QUANTUM_LEVEL_MIN..=QUANTUM_LEVEL_MAX).contains(&level)
                    || !(QUANTUM_MEMORY_MIN..=QUANTUM_MEMORY_MAX)
                        .contains(&memory)
                {
                    invalid_data!(
                        "Quantum parameters out of range \
                         (level {}, memory {})",
                        level,
                        memory
                    );
                }
                Ok(CompressionType::Quantum(level, memory))
            }
            CTYPE_LZX => {
                lzx_window((bits >> 8) & 0x1f).map(CompressionType::Lzx)
            }
            _ => invalid_data!("Unknown compression type: 0x{:04x}", bits),
        }
    }

    /// Returns a fresh decompressor for one folder, or `None` if this
    /// scheme cannot be decoded.
    pub(crate) fn decompressor(self) -> Option<Decompressor> {
        match self {
            CompressionType::None => Some(Decompressor::Uncompressed),
            CompressionType::MsZip => {
                Some(Decompressor::MsZip(Box::new(MsZipDecompressor::new())))
            }
            CompressionType::Quantum(_, _) => None,
            CompressionType::Lzx(window_size) => {
                Some(Decompressor::Lzx(Box::new(Lzxd::new(window_size))))
            }
        }
    }
}

fn lzx_window(exponent: u16) -> io::Result<lzxd::WindowSize> {
    use lzxd::WindowSize;
    const WINDOWS: [WindowSize; 11] = [
        WindowSize::KB32,
        WindowSize::KB64,
        WindowSize::KB128,
        WindowSize::KB256,
        WindowSize::KB512,
        WindowSize::MB1,
        WindowSize::MB2,
        WindowSize::MB4,
        WindowSize::MB8,
        WindowSize::MB16,
        WindowSize::MB32,
    ];
    match exponent.checked_sub(15).and_then(|i| WINDOWS.get(i as usize)) {
        Some(&window) => Ok(window),
        None => invalid_data!("Invalid LZX window: 2^{} bytes", exponent),
    }
}

/// Per-folder decompression state.  A folder's blocks must be fed through
/// the same decompressor in order.
pub(crate) enum Decompressor {
    Uncompressed,
    MsZip(Box<MsZipDecompressor>),
    Lzx(Box<Lzxd>),
}

impl Decompressor {
    pub(crate) fn decompress(
        &mut self,
        data: Vec<u8>,
        uncompressed_size: usize,
    ) -> io::Result<Vec<u8>> {
        match self {
            Decompressor::Uncompressed => {
                if data.len() != uncompressed_size {
                    invalid_data!(
                        "Uncompressed block is {} bytes, header says {}",
                        data.len(),
                        uncompressed_size
                    );
                }
                Ok(data)
            }
            Decompressor::MsZip(decompressor) => {
                decompressor.decompress_block(&data, uncompressed_size)
            }
            Decompressor::Lzx(decompressor) => Ok(decompressor
                .decompress_next(&data, uncompressed_size)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                .to_vec()),
        }
    }
}
