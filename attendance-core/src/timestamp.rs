use std::fmt::{Display, Formatter};

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::error::{AttendanceError, Result};

/// Text format used when writing timestamps to the attendance log. The date comes first so that
/// the first ten characters can be compared as a calendar date.
pub const STORED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const PARSE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// A wall clock timestamp, as recorded for attendance entries and exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Creates a new `Timestamp` from a date-time.
    pub fn new(date_time: NaiveDateTime) -> Timestamp {
        Timestamp(date_time)
    }

    /// Parses a timestamp in the stored text format. The fractional seconds are optional.
    pub fn parse(text: &str) -> Result<Timestamp> {
        let mut last_error = None;
        for format in PARSE_FORMATS.iter() {
            match NaiveDateTime::parse_from_str(text, format) {
                Ok(date_time) => return Ok(Timestamp(date_time)),
                Err(error) => last_error = Some(error),
            }
        }
        Err(AttendanceError::Format {
            value: text.to_owned(),
            reason: last_error
                .map(|error| error.to_string())
                .unwrap_or_else(|| "no format matched".to_owned()),
        })
    }

    /// Formats this timestamp in the stored text format.
    pub fn to_stored_string(&self) -> String {
        self.0.format(STORED_FORMAT).to_string()
    }

    /// Returns the calendar date of this timestamp.
    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// Returns the seconds elapsed since `earlier`, including the fractional part. Negative if
    /// `earlier` is actually later.
    pub fn seconds_since(&self, earlier: &Timestamp) -> f64 {
        let elapsed = self.0 - earlier.0;
        match elapsed.num_microseconds() {
            Some(micros) => micros as f64 / 1_000_000.0,
            None => elapsed.num_milliseconds() as f64 / 1_000.0,
        }
    }

    /// Get the underlying date-time
    pub fn as_naive(&self) -> &NaiveDateTime {
        &self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_stored_string())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_stored_string())
    }
}

/// A timestamp as read back from the attendance log.
///
/// Rows are not always written by this crate, so a stored value may not be in the stored format.
/// Such text is kept as is: it can still be listed, and only code that needs the actual time
/// (computing a duration) fails on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredTime {
    Valid(Timestamp),
    Malformed(String),
}

impl StoredTime {
    /// Wraps stored text, parsing it if it is in the stored format.
    pub fn from_stored(text: String) -> StoredTime {
        match Timestamp::parse(&text) {
            Ok(timestamp) => StoredTime::Valid(timestamp),
            Err(error) => {
                log::warn!("Keeping malformed stored timestamp: {}", error);
                StoredTime::Malformed(text)
            }
        }
    }

    /// Returns the parsed timestamp, or a [Format](AttendanceError::Format) error carrying the
    /// stored text.
    pub fn timestamp(&self) -> Result<Timestamp> {
        match self {
            StoredTime::Valid(timestamp) => Ok(*timestamp),
            StoredTime::Malformed(text) => Timestamp::parse(text),
        }
    }
}

impl From<Timestamp> for StoredTime {
    fn from(timestamp: Timestamp) -> StoredTime {
        StoredTime::Valid(timestamp)
    }
}

impl Display for StoredTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredTime::Valid(timestamp) => write!(f, "{}", timestamp),
            StoredTime::Malformed(text) => write!(f, "{}", text),
        }
    }
}

impl Serialize for StoredTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Source of the current time for presence checks.
pub trait Clock: Send + Sync {
    /// Returns the current local time.
    fn now(&self) -> Timestamp;

    /// Returns the current local date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// A [Clock](Clock) that reads the local system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(Local::now().naive_local())
    }
}
