//! Persistence of [AttendanceRecords](crate::AttendanceRecord).
//!
//! The [AttendanceStore](crate::store::AttendanceStore) trait is what the presence detector and
//! the service talk to. [SqliteStore](crate::store::SqliteStore) is the implementation used by
//! the server.

use chrono::NaiveDate;

use crate::error::Result;
use crate::{AttendanceRecord, Timestamp};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Durable storage for attendance records. Every call persists immediately.
pub trait AttendanceStore: Send + Sync {
    /// Returns the most recent record of `user_id` that has no exit time yet.
    fn find_open_record(&self, user_id: &str) -> Result<Option<AttendanceRecord>>;

    /// Inserts a new open record and returns its id.
    fn create_entry(&self, user_id: &str, entry_time: Timestamp) -> Result<i64>;

    /// Sets exit time and duration of the open record `record_id`. Fails with `NotFound` if the
    /// record does not exist and with `AlreadyClosed` if it was closed before.
    fn close_entry(&self, record_id: i64, exit_time: Timestamp, duration: f64) -> Result<()>;

    /// Counts the records of `user_id`, open or closed, that were entered on `today`.
    fn count_today(&self, user_id: &str, today: NaiveDate) -> Result<u64>;

    /// Returns all records, most recent entry first.
    fn list_all(&self) -> Result<Vec<AttendanceRecord>>;
}
