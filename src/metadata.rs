use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::consts;
use crate::datetime::system_time_from_bits;
use crate::file::FileEntry;

/// Sets the last-write time of a just-written file from its entry.  Entries
/// with an invalid stored date are left with the current time.
pub(crate) fn restore_timestamp(
    file: &File,
    entry: &FileEntry,
) -> io::Result<()> {
    let (date, time) = entry.dos_datetime();
    match system_time_from_bits(date, time, entry.is_time_utc()) {
        Some(modified) => file.set_modified(modified),
        None => {
            tracing::debug!(
                name = entry.name(),
                date,
                time,
                "entry has no valid timestamp"
            );
            Ok(())
        }
    }
}

/// Applies the read-only, hidden, system and archive bits of an entry to a
/// closed file.
pub(crate) fn restore_attributes(
    path: &Path,
    entry: &FileEntry,
) -> io::Result<()> {
    let attributes = entry.attributes() & consts::ATTR_RESTORABLE;
    set_platform_attributes(path, attributes)?;
    if attributes & consts::ATTR_READ_ONLY != 0 {
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(windows)]
fn set_platform_attributes(path: &Path, attributes: u16) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt;

    use winapi::um::fileapi::SetFileAttributesW;
    use winapi::um::winnt::FILE_ATTRIBUTE_NORMAL;

    // Read-only goes through the permissions API like everywhere else.
    let bits = (attributes & !consts::ATTR_READ_ONLY) as u32;
    let bits = if bits == 0 { FILE_ATTRIBUTE_NORMAL } else { bits };
    let wide: Vec<u16> =
        path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
    // SAFETY: `wide` is a null-terminated UTF-16 path that outlives the call.
    let ok = unsafe { SetFileAttributesW(wide.as_ptr(), bits) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(windows))]
fn set_platform_attributes(_path: &Path, _attributes: u16) -> io::Result<()> {
    Ok(())
}
