//! Calendar-day helpers shared by the report job.

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Utc};

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Microsecond-epoch bounds of `date` in UTC. `end` is exactly one day after `start`.
/// Falls back to today (UTC) when no date is given.
pub fn timestamp_range(date: Option<NaiveDate>) -> (i64, i64) {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp() * MICROS_PER_SECOND;
    (start, start + MICROS_PER_DAY)
}

/// Integer date key, e.g. 2024-03-07 -> 20240307.
pub fn date_to_int(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// The day before `today`, or `today` itself at the bottom of chrono's range.
pub fn default_report_date(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}
