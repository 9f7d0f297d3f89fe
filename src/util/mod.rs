#![allow(clippy::module_name_repetitions)]
//! Small utilities: command execution, filesystem helpers, timestamps.

pub mod exec;
pub mod fs;

pub use exec::{ExecOutput, ExecRequest, ExecService};

use time::macros::format_description;
use time::OffsetDateTime;

/// Timestamp used in analysis labels and records, e.g. `20250314_09:41:07`.
pub fn analysis_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour]:[minute]:[second]");
    at.format(&fmt).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Current local time, falling back to UTC when the offset is unknown.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
