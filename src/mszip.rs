use std::io;

use byteorder::{LittleEndian, WriteBytesExt};

const MSZIP_SIGNATURE: u16 = 0x4B43; // "CK" stored little-endian
const MSZIP_SIGNATURE_LEN: usize = 2;
const DEFLATE_MAX_DICT_LEN: usize = 0x8000;

/// Inflates MSZIP blocks.  Each block is an independent deflate stream,
/// except that back-references may reach into the previous 32 KiB of
/// output, so that history is replayed before every block.
pub struct MsZipDecompressor {
    decompressor: flate2::Decompress,
    dictionary: Vec<u8>,
}

impl MsZipDecompressor {
    pub fn new() -> MsZipDecompressor {
        MsZipDecompressor {
            decompressor: flate2::Decompress::new(false),
            dictionary: Vec::with_capacity(DEFLATE_MAX_DICT_LEN),
        }
    }

    pub fn decompress_block(
        &mut self,
        data: &[u8],
        uncompressed_size: usize,
    ) -> io::Result<Vec<u8>> {
        if data.len() < MSZIP_SIGNATURE_LEN
            || ((data[0] as u16) | ((data[1] as u16) << 8)) != MSZIP_SIGNATURE
        {
            invalid_data!(
                "MSZIP decompression failed: Invalid block signature"
            );
        }
        let data = &data[MSZIP_SIGNATURE_LEN..];
        self.decompressor.reset(false);
        if !self.dictionary.is_empty() {
            self.prime_dictionary()?;
        }
        let mut out = Vec::<u8>::with_capacity(uncompressed_size);
        let flush = flate2::FlushDecompress::Finish;
        if let Err(error) =
            self.decompressor.decompress_vec(data, &mut out, flush)
        {
            invalid_data!("MSZIP decompression failed: {}", error);
        }
        if out.len() != uncompressed_size {
            invalid_data!(
                "MSZIP decompression failed: Incorrect uncompressed size \
                 (expected {}, was actually {})",
                uncompressed_size,
                out.len()
            );
        }
        self.remember(&out);
        Ok(out)
    }

    // Feeds the history through the inflater as a stored block, so that
    // the next block's back-references resolve against it.
    fn prime_dictionary(&mut self) -> io::Result<()> {
        let length = self.dictionary.len() as u16;
        let mut chunk: Vec<u8> = vec![0];
        chunk.write_u16::<LittleEndian>(length)?;
        chunk.write_u16::<LittleEndian>(!length)?;
        chunk.extend_from_slice(&self.dictionary);
        let mut out = Vec::with_capacity(self.dictionary.len());
        let flush = flate2::FlushDecompress::Sync;
        match self.decompressor.decompress_vec(&chunk, &mut out, flush) {
            Ok(flate2::Status::Ok) => Ok(()),
            Ok(status) => {
                invalid_data!("MSZIP history replay stopped: {:?}", status)
            }
            Err(error) => {
                invalid_data!("MSZIP history replay failed: {}", error)
            }
        }
    }

    fn remember(&mut self, out: &[u8]) {
        if out.len() >= DEFLATE_MAX_DICT_LEN {
            let start = out.len() - DEFLATE_MAX_DICT_LEN;
            self.dictionary.clear();
            self.dictionary.extend_from_slice(&out[start..]);
        } else {
            let total = self.dictionary.len() + out.len();
            if total > DEFLATE_MAX_DICT_LEN {
                self.dictionary.drain(..(total - DEFLATE_MAX_DICT_LEN));
            }
            self.dictionary.extend_from_slice(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use flate2::{Compress, Compression, FlushCompress};
    use rand::{RngCore, SeedableRng};

    use super::{MsZipDecompressor, DEFLATE_MAX_DICT_LEN};

    #[test]
    fn read_compressed_data() {
        let input: &[u8] = b"CK%\xcc\xd1\t\x031\x0c\x04\xd1V\xb6\x80#\x95\xa4\
              \t\xc5\x12\xc7\x82e\xfb,\xa9\xff\x18\xee{x\xf3\x9d\xdb\x1c\\Q\
              \x0e\x9d}n\x04\x13\xe2\x96\x17\xda\x1ca--kC\x94\x8b\xd18nX\xe7\
              \x89az\x00\x8c\x15>\x15i\xbe\x0e\xe6hTj\x8dD%\xba\xfc\xce\x1e\
              \x96\xef\xda\xe0r\x0f\x81t>%\x9f?\x12]-\x87";
        let expected: &[u8] =
            b"Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed \
              do eiusmod tempor incididunt ut labore et dolore magna aliqua.";
        assert!(input.len() < expected.len());
        let mut decompressor = MsZipDecompressor::new();
        let output =
            decompressor.decompress_block(input, expected.len()).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut decompressor = MsZipDecompressor::new();
        let error = decompressor.decompress_block(b"XY\x03\x00", 0);
        assert!(error.is_err());
    }

    #[test]
    fn wrong_uncompressed_size_is_rejected() {
        let blocks = compress_blocks(b"Hello, world!\n");
        let mut decompressor = MsZipDecompressor::new();
        assert!(decompressor.decompress_block(&blocks[0], 20).is_err());
    }

    // Produces MSZIP blocks the way cabinet writers do: one shared deflate
    // stream, sync-flushed per block, with each non-final block closed by
    // an empty final block.
    fn compress_blocks(mut data: &[u8]) -> Vec<Vec<u8>> {
        let mut compressor = Compress::new(Compression::best(), false);
        let mut blocks = Vec::new();
        loop {
            let len = data.len().min(DEFLATE_MAX_DICT_LEN);
            let is_last = len == data.len();
            let mut out = Vec::with_capacity(0x10000);
            out.extend_from_slice(b"CK");
            let flush =
                if is_last {
                    FlushCompress::Finish
                } else {
                    FlushCompress::Sync
                };
            compressor.compress_vec(&data[..len], &mut out, flush).unwrap();
            if !is_last {
                out.extend_from_slice(&[0x03, 0x00]);
            }
            blocks.push(out);
            data = &data[len..];
            if is_last {
                return blocks;
            }
        }
    }

    fn decompress_blocks(blocks: &[Vec<u8>], original: &[u8]) -> Vec<u8> {
        let mut decompressor = MsZipDecompressor::new();
        let mut output = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let start = index * DEFLATE_MAX_DICT_LEN;
            let size = (original.len() - start).min(DEFLATE_MAX_DICT_LEN);
            output.extend(decompressor.decompress_block(block, size).unwrap());
        }
        output
    }

    #[test]
    fn history_carries_across_blocks() {
        let original: Vec<u8> = (0..DEFLATE_MAX_DICT_LEN * 3 + 1000)
            .map(|index| (index % 251) as u8)
            .collect();
        let blocks = compress_blocks(&original);
        assert_eq!(blocks.len(), 4);
        assert_eq!(decompress_blocks(&blocks, &original), original);
    }

    #[test]
    fn random_data_over_several_blocks() {
        let mut original = vec![0; DEFLATE_MAX_DICT_LEN * 2 + 17];
        rand::rngs::SmallRng::seed_from_u64(7).fill_bytes(&mut original);
        let blocks = compress_blocks(&original);
        assert_eq!(decompress_blocks(&blocks, &original), original);
    }
}
