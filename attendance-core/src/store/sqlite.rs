use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{AttendanceError, Result};
use crate::store::AttendanceStore;
use crate::{AttendanceRecord, StoredTime, Timestamp};

const CREATE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT,
    entry_time DATETIME,
    exit_time DATETIME,
    duration INTEGER
)";

const SELECT_COLUMNS: &str = "SELECT id, user_id, entry_time, exit_time, duration FROM attendance";

/// An [AttendanceStore](AttendanceStore) backed by a single SQLite file.
///
/// No connection is kept around: each operation opens the file, does its work and closes it
/// again when the connection is dropped, on success and on error alike.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the store at `path`, creating the file and the `attendance` table if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SqliteStore> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let store = SqliteStore { path };
        let connection = store.connect()?;
        connection.execute_batch(CREATE_SCHEMA)?;
        log::info!("Attendance store ready at {}", store.path.display());

        Ok(store)
    }

    /// Get the path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }
}

impl AttendanceStore for SqliteStore {
    fn find_open_record(&self, user_id: &str) -> Result<Option<AttendanceRecord>> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "{} WHERE user_id = ?1 AND exit_time IS NULL ORDER BY id DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![user_id],
                RawRecord::from_row,
            )
            .optional()?;
        Ok(raw.map(RawRecord::into_record))
    }

    fn create_entry(&self, user_id: &str, entry_time: Timestamp) -> Result<i64> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO attendance (user_id, entry_time) VALUES (?1, ?2)",
            params![user_id, entry_time.to_stored_string()],
        )?;
        Ok(connection.last_insert_rowid())
    }

    fn close_entry(&self, record_id: i64, exit_time: Timestamp, duration: f64) -> Result<()> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE attendance SET exit_time = ?1, duration = ?2 WHERE id = ?3 AND exit_time IS NULL",
            params![exit_time.to_stored_string(), duration, record_id],
        )?;
        if updated > 0 {
            return Ok(());
        }

        let exists = connection
            .query_row(
                "SELECT 1 FROM attendance WHERE id = ?1",
                params![record_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            Err(AttendanceError::AlreadyClosed(record_id))
        } else {
            Err(AttendanceError::NotFound(record_id))
        }
    }

    fn count_today(&self, user_id: &str, today: NaiveDate) -> Result<u64> {
        let connection = self.connect()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM attendance WHERE user_id = ?1 AND substr(entry_time, 1, 10) = ?2",
            params![user_id, today.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_all(&self) -> Result<Vec<AttendanceRecord>> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "{} ORDER BY entry_time DESC, id DESC",
            SELECT_COLUMNS
        ))?;
        let rows = statement.query_map([], RawRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record());
        }
        Ok(records)
    }
}

/// A row as SQLite hands it out, before the timestamps are wrapped.
struct RawRecord {
    id: i64,
    user_id: String,
    entry_time: String,
    exit_time: Option<String>,
    duration: Option<f64>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_time: row.get(2)?,
            exit_time: row.get(3)?,
            duration: row.get(4)?,
        })
    }

    fn into_record(self) -> AttendanceRecord {
        AttendanceRecord {
            id: self.id,
            user_id: self.user_id,
            entry_time: StoredTime::from_stored(self.entry_time),
            exit_time: self.exit_time.map(StoredTime::from_stored),
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn scratch_store() -> anyhow::Result<(TempDir, SqliteStore)> {
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(dir.path().join("attendance.db"))?;
        Ok((dir, store))
    }

    fn at(text: &str) -> Timestamp {
        Timestamp::parse(text).unwrap()
    }

    fn stored(text: &str) -> StoredTime {
        at(text).into()
    }

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn open_creates_missing_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("attendance.db");
        let store = SqliteStore::open(&path)?;
        assert!(path.exists());
        assert!(store.list_all()?.is_empty());

        // reopening keeps existing rows
        store.create_entry("10.0.0.1", at("2024-03-01 08:00:00"))?;
        let reopened = SqliteStore::open(&path)?;
        assert_eq!(reopened.list_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn create_and_find_open_record() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        assert_eq!(store.find_open_record("10.0.0.1")?, None);

        let id = store.create_entry("10.0.0.1", at("2024-03-01 08:00:00.125"))?;
        let record = store.find_open_record("10.0.0.1")?.expect("open record");
        assert_eq!(record.id, id);
        assert_eq!(record.user_id, "10.0.0.1");
        assert_eq!(record.entry_time, stored("2024-03-01 08:00:00.125"));
        assert!(record.is_open());
        assert_eq!(record.duration, None);

        assert_eq!(store.find_open_record("10.0.0.2")?, None);
        Ok(())
    }

    #[test]
    fn find_open_record_prefers_highest_id() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        store.create_entry("10.0.0.1", at("2024-03-01 09:00:00"))?;
        let newest = store.create_entry("10.0.0.1", at("2024-03-01 08:00:00"))?;
        assert_eq!(store.find_open_record("10.0.0.1")?.map(|r| r.id), Some(newest));
        Ok(())
    }

    #[test]
    fn close_entry_sets_exit_and_duration() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        let id = store.create_entry("10.0.0.1", at("2024-03-01 08:00:00"))?;
        store.close_entry(id, at("2024-03-01 08:01:30.5"), 90.5)?;

        assert_eq!(store.find_open_record("10.0.0.1")?, None);
        let records = store.list_all()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].exit_time, Some(stored("2024-03-01 08:01:30.5")));
        assert_eq!(records[0].duration, Some(90.5));
        Ok(())
    }

    #[test]
    fn close_entry_of_missing_record_fails() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        let result = store.close_entry(42, at("2024-03-01 08:00:00"), 1.0);
        assert!(matches!(result, Err(AttendanceError::NotFound(42))));
        Ok(())
    }

    #[test]
    fn closed_records_are_immutable() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        let id = store.create_entry("10.0.0.1", at("2024-03-01 08:00:00"))?;
        store.close_entry(id, at("2024-03-01 08:00:10"), 10.0)?;

        let result = store.close_entry(id, at("2024-03-01 09:00:00"), 3600.0);
        assert!(matches!(result, Err(AttendanceError::AlreadyClosed(_))));
        assert_eq!(store.list_all()?[0].duration, Some(10.0));
        Ok(())
    }

    #[test]
    fn count_today_matches_date_prefix() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        assert_eq!(store.count_today("10.0.0.1", day("2024-03-01"))?, 0);

        let id = store.create_entry("10.0.0.1", at("2024-03-01 08:00:00"))?;
        store.close_entry(id, at("2024-03-01 08:00:10"), 10.0)?;
        store.create_entry("10.0.0.1", at("2024-03-01 23:59:59.999999"))?;
        store.create_entry("10.0.0.1", at("2024-03-02 00:00:00"))?;
        store.create_entry("10.0.0.2", at("2024-03-01 12:00:00"))?;

        assert_eq!(store.count_today("10.0.0.1", day("2024-03-01"))?, 2);
        assert_eq!(store.count_today("10.0.0.1", day("2024-03-02"))?, 1);
        assert_eq!(store.count_today("10.0.0.2", day("2024-03-02"))?, 0);
        Ok(())
    }

    #[test]
    fn list_all_orders_by_entry_time_descending() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        store.create_entry("a", at("2024-03-01 10:00:00"))?;
        store.create_entry("b", at("2024-03-01 12:00:00"))?;
        store.create_entry("c", at("2024-03-01 08:00:00"))?;

        let users: Vec<String> = store.list_all()?.into_iter().map(|r| r.user_id).collect();
        assert_eq!(users, vec!["b", "a", "c"]);
        Ok(())
    }

    #[test]
    fn corrupt_timestamp_is_kept_verbatim() -> anyhow::Result<()> {
        let (_dir, store) = scratch_store()?;
        store.connect()?.execute(
            "INSERT INTO attendance (user_id, entry_time) VALUES ('10.0.0.1', 'not a time')",
            [],
        )?;
        store.create_entry("10.0.0.2", at("2024-03-01 08:00:00"))?;

        let record = store.find_open_record("10.0.0.1")?.expect("open record");
        assert_eq!(record.entry_time, StoredTime::Malformed("not a time".to_owned()));
        match record.entry_time.timestamp() {
            Err(AttendanceError::Format { value, .. }) => assert_eq!(value, "not a time"),
            other => panic!("expected a format error, got {:?}", other),
        }

        let records = store.list_all()?;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .any(|record| record.entry_time == stored("2024-03-01 08:00:00")));
        Ok(())
    }
}
