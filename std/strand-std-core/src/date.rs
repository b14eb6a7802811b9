//!
//! Wall-clock Dates
//!
//! Fire dates and sleep deadlines are absolute UTC timestamps. Intervals are
//! `std::time::Duration`, so they can never be negative.
//!
//! - `now()` - Current date
//! - `advance(date, interval)` - `date + interval`, saturating at the
//!   largest representable date
//! - `until(date)` - Time left until `date`, zero once it has passed
//!

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub type Date = DateTime<Utc>;

pub fn now() -> Date {
    Utc::now()
}

pub fn advance(date: Date, interval: Duration) -> Date {
    TimeDelta::from_std(interval)
        .ok()
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn until(date: Date) -> Duration {
    (date - now()).to_std().unwrap_or(Duration::ZERO)
}

/// Whole seconds plus microseconds as a `Duration`; negative seconds clamp to zero
pub fn interval_from_parts(seconds: i64, microseconds: u32) -> Duration {
    if seconds < 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(seconds as u64) + Duration::from_micros(u64::from(microseconds))
}
