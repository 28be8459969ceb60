use std::io::{self, Read};

use byteorder::ReadBytesExt;

use crate::consts;

/// Reads the raw bytes of a null-terminated string (without the
/// terminator).
pub(crate) fn read_null_terminated_bytes<R: Read>(
    reader: &mut R,
) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::<u8>::with_capacity(consts::MAX_STRING_SIZE);
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        } else if bytes.len() == consts::MAX_STRING_SIZE {
            invalid_data!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        bytes.push(byte);
    }
    Ok(bytes)
}

pub(crate) fn read_null_terminated_string<R: Read>(
    reader: &mut R,
    is_utf8: bool,
) -> io::Result<String> {
    let bytes = read_null_terminated_bytes(reader)?;
    decode_name(bytes, is_utf8)
}

/// Decodes a stored name.  Names flagged as UTF are UTF-8; all others are
/// in a legacy single-byte code page, which we map byte-for-byte onto the
/// first 256 code points.
pub(crate) fn decode_name(
    bytes: Vec<u8>,
    is_utf8: bool,
) -> io::Result<String> {
    if is_utf8 {
        match String::from_utf8(bytes) {
            Ok(string) => Ok(string),
            Err(error) => {
                invalid_data!("Name flagged as UTF is not UTF-8: {}", error)
            }
        }
    } else if bytes.is_ascii() {
        // ASCII is valid UTF-8.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(bytes.iter().map(|&byte| byte as char).collect())
    }
}
