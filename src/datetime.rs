use std::convert::TryInto;
use std::time::SystemTime;

use time::{PrimitiveDateTime, UtcOffset};

pub fn datetime_from_bits(date: u16, time: u16) -> Option<PrimitiveDateTime> {
    let year = (date >> 9) as i32 + 1980;
    let month = (((date >> 5) & 0xf) as u8).try_into().ok()?;
    let day = (date & 0x1f) as u8;
    let date = time::Date::from_calendar_date(year, month, day).ok()?;

    let hour = (time >> 11) as u8;
    let minute = ((time >> 5) & 0x3f) as u8;
    let second = 2 * (time & 0x1f) as u8;
    let time = time::Time::from_hms(hour, minute, second).ok()?;

    Some(PrimitiveDateTime::new(date, time))
}

/// Converts a stored DOS date/time into a native timestamp.  Unless
/// `is_utc` is set, the stored value is taken to be local time.
pub fn system_time_from_bits(
    date: u16,
    time: u16,
    is_utc: bool,
) -> Option<SystemTime> {
    let datetime = datetime_from_bits(date, time)?;
    let offset = if is_utc {
        UtcOffset::UTC
    } else {
        local_offset_at(datetime)
    };
    Some(datetime.assume_offset(offset).into())
}

fn local_offset_at(datetime: PrimitiveDateTime) -> UtcOffset {
    let guess = datetime.assume_utc();
    match UtcOffset::local_offset_at(guess) {
        Ok(offset) => offset,
        Err(error) => {
            tracing::warn!(
                %error,
                "local UTC offset is unavailable; treating time as UTC"
            );
            UtcOffset::UTC
        }
    }
}
