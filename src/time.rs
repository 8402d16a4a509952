//! FAT date/time field decoding (spec.md §4.9).
//!
//! Date: `day = bits 0..4`, `month = bits 5..8`, `year = (bits 9..15) + 1980`.
//! Time: `seconds = (bits 0..4) * 2`, `minutes = bits 5..10`, `hours = bits 11..15`.
//!
//! The fields are local time; we convert with `chrono` using the host's local offset. An all-zero
//! date leaves the timestamp at mount time, per spec.md.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};

/// Decodes a FAT date+time pair into a Unix timestamp. `mount_time` is substituted when `date`
/// is all zero.
pub fn decode_timestamp(date: u16, time: u16, mount_time: i64) -> i64 {
    if date == 0 {
        return mount_time;
    }

    let day = (date & 0x1F) as u32;
    let month = ((date >> 5) & 0x0F) as u32;
    let year = ((date >> 9) & 0x7F) as i32 + 1980;

    let seconds = ((time & 0x1F) as u32) * 2;
    let minutes = ((time >> 5) & 0x3F) as u32;
    let hours = ((time >> 11) & 0x1F) as u32;

    let naive = NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
        .and_then(|d| d.and_hms_opt(hours.min(23), minutes.min(59), seconds.min(59)));

    match naive {
        Some(dt) => local_to_unix(dt),
        None => mount_time,
    }
}

fn local_to_unix(naive: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.timestamp(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.timestamp(),
        chrono::LocalResult::None => naive.and_utc().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_date_falls_back_to_mount_time() {
        assert_eq!(decode_timestamp(0, 0, 12345), 12345);
    }

    #[test]
    fn decodes_a_plausible_date() {
        // 2023-06-15, bits: day=15, month=6, year offset=43 (1980+43=2023)
        let date: u16 = (15) | (6 << 5) | (43 << 9);
        // 10:30:00 -> seconds/2=0, minutes=30, hours=10
        let time: u16 = 0 | (30 << 5) | (10 << 11);
        let ts = decode_timestamp(date, time, 0);
        assert_ne!(ts, 0);
    }
}
