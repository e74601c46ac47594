//! Output path generation.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `dir/recording_YYYY_MM_DD_HH_MM_SS_mmm.ext` for the current UTC time.
///
/// An empty `extension` yields a bare name (used for image-sequence
/// directories).
pub fn recording_path(dir: impl AsRef<Path>, extension: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    dir.as_ref().join(recording_name(now, extension))
}

/// File name for a recording started `since_epoch` after the UNIX epoch.
pub fn recording_name(since_epoch: Duration, extension: &str) -> String {
    let secs = since_epoch.as_secs();
    let millis = since_epoch.subsec_millis();
    let (year, month, day) = civil_date(secs / 86_400);
    let time_of_day = secs % 86_400;

    let stem = format!(
        "recording_{:04}_{:02}_{:02}_{:02}_{:02}_{:02}_{:03}",
        year,
        month,
        day,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
        millis
    );
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}

fn is_leap(year: u64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// (year, month 1-12, day 1-31) for a day count since 1970-01-01.
fn civil_date(mut days: u64) -> (u64, u32, u64) {
    let mut year = 1970;
    loop {
        let in_year = if is_leap(year) { 366 } else { 365 };
        if days < in_year {
            break;
        }
        days -= in_year;
        year += 1;
    }
    let months = [
        31,
        if is_leap(year) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 0;
    for &len in &months {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }
    (year, month + 1, days + 1)
}
