use byteorder::{ByteOrder, LittleEndian};

/// Computes the MS-CAB checksum of `data`, folding it into `seed`.
///
/// Whole 32-bit little-endian words are XORed in; the 1-3 trailing bytes
/// are packed most-significant first before the final XOR.
pub(crate) fn compute(data: &[u8], seed: u32) -> u32 {
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

/// Computes the checksum stored in a CFDATA header: the payload first,
/// then the two size words and the block's reserve area.
pub(crate) fn data_block_checksum(
    reserve_data: &[u8],
    data: &[u8],
    compressed_size: u16,
    uncompressed_size: u16,
) -> u32 {
    let mut header = Vec::with_capacity(4 + reserve_data.len());
    header.extend_from_slice(&compressed_size.to_le_bytes());
    header.extend_from_slice(&uncompressed_size.to_le_bytes());
    header.extend_from_slice(reserve_data);
    compute(&header, compute(data, 0))
}
