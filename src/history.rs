//! History records and the provenance stamp.
//!
//! A stamp is one fixed-width history record:
//! `"<tool> v<version> run on"` cut to [`JOB_WIDTH`] characters, a space,
//! the 24-character ctime rendering of the run time, and space padding up to
//! [`RECORD_LEN`].

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};

use crate::model::RECORD_LEN;

/// Maximum characters of job text before the timestamp.
pub const JOB_WIDTH: usize = 55;

const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Job text naming `tool` and this crate's version.
pub fn job_string(tool: &str) -> String {
    format!("{tool} v{} run on", env!("CARGO_PKG_VERSION"))
}

/// Build a fixed-width stamp for `job` run at `at`.
pub fn stamp<Tz>(job: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut line: String = job.chars().take(JOB_WIDTH).collect();
    line.push(' ');
    line.push_str(&at.format(CTIME_FORMAT).to_string());
    let width = line.chars().count();
    if width < RECORD_LEN {
        line.extend(std::iter::repeat(' ').take(RECORD_LEN - width));
    }
    line.chars().take(RECORD_LEN).collect()
}

/// Stamp for `tool` at the current local time.
pub fn stamp_now(tool: &str) -> String {
    stamp(&job_string(tool), &Local::now())
}

/// Strip the trailing blanks and NULs a fixed-width record is padded with.
pub fn trim_record(line: &str) -> &str {
    line.trim_end_matches([' ', '\0'])
}
