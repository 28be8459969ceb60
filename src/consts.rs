pub const SIGNATURE_BYTES: &[u8; 4] = b"MSCF";

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 3;

pub const MAX_TOTAL_CAB_SIZE: u32 = 0x7fffffff;
pub const MAX_STRING_SIZE: usize = 255;

// Bytes between a file record's size field and its name.
pub const FILE_RECORD_SKIP: i64 = 12;

// Header flags:
pub const FLAG_PREV_CABINET: u16 = 0x1;
pub const FLAG_NEXT_CABINET: u16 = 0x2;
pub const FLAG_RESERVE_PRESENT: u16 = 0x4;

// Special folder indices in file records:
pub const IFOLD_CONTINUED_FROM_PREV: u16 = 0xfffd;
pub const IFOLD_CONTINUED_TO_NEXT: u16 = 0xfffe;
pub const IFOLD_CONTINUED_PREV_AND_NEXT: u16 = 0xffff;

// File attributes:
pub const ATTR_READ_ONLY: u16 = 0x01;
pub const ATTR_HIDDEN: u16 = 0x02;
pub const ATTR_SYSTEM: u16 = 0x04;
pub const ATTR_ARCH: u16 = 0x20;
pub const ATTR_EXEC: u16 = 0x40;
pub const ATTR_NAME_IS_UTF: u16 = 0x80;
// Not part of MS-CAB; some writers set it when the stored time is UTC.
pub const ATTR_TIME_IS_UTC: u16 = 0x100;

pub const ATTR_RESTORABLE: u16 =
    ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_ARCH;
