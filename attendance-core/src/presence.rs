//! Presence detection: turns a distance from the reference point into entry and exit events.
//!
//! Each user is either [Away](PresenceState::Away) or [Present](PresenceState::Present). Being
//! present means having an open record in the [AttendanceStore](crate::store::AttendanceStore).
//! The detector looks up the open record and then creates or closes one, which is two separate
//! store calls. To keep two concurrent checks of the same user from both inserting a record, the
//! lookup and the mutation run while holding a lock that is specific to that user.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::validate_threshold;
use crate::error::Result;
use crate::store::AttendanceStore;
use crate::{Clock, Timestamp};

/// Whether a user is currently within the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Away,
    Present,
}

impl Display for PresenceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceState::Away => write!(f, "away"),
            PresenceState::Present => write!(f, "present"),
        }
    }
}

/// Outcome of a single presence check.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The user was away and is now within the threshold; a record was opened.
    Entered { record_id: i64, at: Timestamp },

    /// The user was present and is now outside the threshold; the record was closed.
    Exited {
        record_id: i64,
        at: Timestamp,
        duration: f64,
    },

    /// Nothing changed, the user remains in the given state.
    Unchanged(PresenceState),
}

impl Transition {
    /// Returns the state the user is in after this transition.
    pub fn state(&self) -> PresenceState {
        match self {
            Transition::Entered { .. } => PresenceState::Present,
            Transition::Exited { .. } => PresenceState::Away,
            Transition::Unchanged(state) => *state,
        }
    }
}

/// Runs the Away/Present state machine against an [AttendanceStore](AttendanceStore).
pub struct PresenceDetector<S, C> {
    store: Arc<S>,
    clock: C,
    threshold_meters: f64,
    user_locks: UserLocks,
}

impl<S: AttendanceStore, C: Clock> PresenceDetector<S, C> {
    /// Creates a new `PresenceDetector` that counts everyone within `threshold_meters` as
    /// present.
    pub fn new(store: Arc<S>, clock: C, threshold_meters: f64) -> Result<PresenceDetector<S, C>> {
        Ok(PresenceDetector {
            store,
            clock,
            threshold_meters: validate_threshold(threshold_meters)?,
            user_locks: UserLocks::default(),
        })
    }

    /// Get the threshold in meters
    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    /// Get the clock used for entry and exit times
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns `true` if `distance` counts as being within the threshold.
    pub fn is_within(&self, distance: f64) -> bool {
        distance <= self.threshold_meters
    }

    /// Records that `user_id` was seen `distance` meters away from the reference point, opening
    /// or closing an attendance record if that changes the user's state.
    pub fn observe(&self, user_id: &str, distance: f64) -> Result<Transition> {
        let lock = self.user_locks.get(user_id);
        let guard = lock_ignoring_poison(&lock);

        let transition = self.transition(user_id, distance);
        drop(guard);
        self.user_locks.release(user_id, lock);
        transition
    }

    fn transition(&self, user_id: &str, distance: f64) -> Result<Transition> {
        let open_record = self.store.find_open_record(user_id)?;
        let now = self.clock.now();

        match (self.is_within(distance), open_record) {
            (true, None) => {
                let record_id = self.store.create_entry(user_id, now)?;
                log::info!("Attendance marked for {} at {}", user_id, now);
                Ok(Transition::Entered { record_id, at: now })
            }
            (false, Some(record)) => {
                let duration = now.seconds_since(&record.entry_time.timestamp()?);
                if let Err(error) = self.store.close_entry(record.id, now, duration) {
                    log::error!(
                        "Could not close attendance record {} of {}: {}",
                        record.id,
                        user_id,
                        error
                    );
                    return Err(error);
                }
                log::info!("Exit recorded for {} after {} seconds", user_id, duration);
                Ok(Transition::Exited {
                    record_id: record.id,
                    at: now,
                    duration,
                })
            }
            (true, Some(_)) => Ok(Transition::Unchanged(PresenceState::Present)),
            (false, None) => Ok(Transition::Unchanged(PresenceState::Away)),
        }
    }
}

/// One mutex per user id. Entries are removed again once nobody holds or waits for them.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn get(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_ignoring_poison(&self.locks);
        Arc::clone(locks.entry(user_id.to_owned()).or_default())
    }

    fn release(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = lock_ignoring_poison(&self.locks);
        drop(lock);
        // the map itself holds the last reference
        if locks
            .get(user_id)
            .map_or(false, |entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock_ignoring_poison(&self.locks).len()
    }
}

// The guarded data is either `()` or the lock map, neither can be left half-updated.
fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::error::AttendanceError;
    use crate::store::SqliteStore;
    use crate::timestamp::tests::ManualClock;

    const THRESHOLD: f64 = 10.0;

    fn detector() -> anyhow::Result<(TempDir, PresenceDetector<SqliteStore, ManualClock>)> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(SqliteStore::open(dir.path().join("attendance.db"))?);
        let clock = ManualClock::at("2024-03-01 08:00:00");
        Ok((dir, PresenceDetector::new(store, clock, THRESHOLD)?))
    }

    #[test]
    fn entering_opens_exactly_one_record() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;

        let first = detector.observe("10.0.0.1", 0.0)?;
        assert!(matches!(first, Transition::Entered { .. }));
        assert_eq!(first.state(), PresenceState::Present);

        detector.clock().advance_millis(5_000);
        let second = detector.observe("10.0.0.1", 3.0)?;
        assert_eq!(second, Transition::Unchanged(PresenceState::Present));

        let records = detector.store.list_all()?;
        assert_eq!(records.len(), 1);
        assert!(records[0].is_open());
        Ok(())
    }

    #[test]
    fn threshold_is_inclusive() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        assert!(detector.is_within(THRESHOLD));
        assert!(!detector.is_within(THRESHOLD + 0.001));
        assert!(matches!(
            detector.observe("10.0.0.1", THRESHOLD)?,
            Transition::Entered { .. }
        ));
        Ok(())
    }

    #[test]
    fn leaving_closes_the_record_with_elapsed_seconds() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;

        let record_id = match detector.observe("10.0.0.1", 0.0)? {
            Transition::Entered { record_id, .. } => record_id,
            other => panic!("expected entry, got {:?}", other),
        };

        detector.clock().advance_millis(90_250);
        match detector.observe("10.0.0.1", 600.0)? {
            Transition::Exited {
                record_id: closed,
                duration,
                ..
            } => {
                assert_eq!(closed, record_id);
                assert!((duration - 90.25).abs() < 1e-6, "got {}", duration);
            }
            other => panic!("expected exit, got {:?}", other),
        }

        let records = detector.store.list_all()?;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        let entry_time = record.entry_time.timestamp()?;
        let exit_time = record.exit_time.as_ref().expect("closed record").timestamp()?;
        let duration = record.duration.expect("closed record");
        assert!((exit_time.seconds_since(&entry_time) - duration).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn staying_away_changes_nothing() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        assert_eq!(
            detector.observe("10.0.0.1", 600.0)?,
            Transition::Unchanged(PresenceState::Away)
        );
        assert!(detector.store.list_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn users_are_tracked_independently() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        detector.observe("10.0.0.1", 0.0)?;
        assert_eq!(
            detector.observe("10.0.0.2", 600.0)?,
            Transition::Unchanged(PresenceState::Away)
        );
        assert!(detector.store.find_open_record("10.0.0.1")?.is_some());
        Ok(())
    }

    #[test]
    fn repeated_cycles_produce_one_record_each() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        for _ in 0..3 {
            detector.observe("10.0.0.1", 1.0)?;
            detector.clock().advance_millis(60_000);
            detector.observe("10.0.0.1", 100.0)?;
            detector.clock().advance_millis(60_000);
        }

        let records = detector.store.list_all()?;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|record| !record.is_open()));
        let entries = records
            .iter()
            .map(|record| record.entry_time.timestamp())
            .collect::<Result<Vec<_>>>()?;
        assert!(entries.windows(2).all(|pair| pair[0] > pair[1]));
        Ok(())
    }

    #[test]
    fn corrupt_entry_time_fails_the_exit() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        detector.store.connect()?.execute(
            "INSERT INTO attendance (user_id, entry_time) VALUES ('10.0.0.1', '01/03/2024 8am')",
            [],
        )?;

        let result = detector.observe("10.0.0.1", 600.0);
        assert!(matches!(result, Err(AttendanceError::Format { .. })));

        let exit_time: Option<String> = detector.store.connect()?.query_row(
            "SELECT exit_time FROM attendance WHERE user_id = '10.0.0.1'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(exit_time, None);
        Ok(())
    }

    #[test]
    fn corrupt_entry_time_does_not_block_staying_present() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        detector.store.connect()?.execute(
            "INSERT INTO attendance (user_id, entry_time) VALUES ('10.0.0.1', '01/03/2024 8am')",
            [],
        )?;

        assert_eq!(
            detector.observe("10.0.0.1", 0.0)?,
            Transition::Unchanged(PresenceState::Present)
        );

        detector.observe("10.0.0.2", 0.0)?;
        let records = detector.store.list_all()?;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .any(|record| record.entry_time.to_string() == "01/03/2024 8am"));
        Ok(())
    }

    #[test]
    fn rejects_invalid_threshold() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(SqliteStore::open(dir.path().join("attendance.db"))?);
        let clock = ManualClock::at("2024-03-01 08:00:00");
        match PresenceDetector::new(store, clock, -1.0) {
            Err(AttendanceError::Validation(message)) => assert!(message.contains("-1")),
            Err(other) => panic!("expected a validation error, got {:?}", other),
            Ok(_) => panic!("negative threshold was accepted"),
        }
        Ok(())
    }

    #[test]
    fn concurrent_entries_open_a_single_record() -> anyhow::Result<()> {
        let (_dir, detector) = detector()?;
        let detector = Arc::new(detector);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let detector = Arc::clone(&detector);
                thread::spawn(move || detector.observe("10.0.0.1", 0.0))
            })
            .collect();

        let mut entered = 0;
        for handle in handles {
            if let Transition::Entered { .. } = handle.join().unwrap()? {
                entered += 1;
            }
        }

        assert_eq!(entered, 1);
        assert_eq!(detector.store.list_all()?.len(), 1);
        assert_eq!(detector.user_locks.len(), 0);
        Ok(())
    }
}
