//! The [AttendanceService](crate::AttendanceService) ties distance computation, presence
//! detection and the attendance log together. Transports hand it the caller's identity and the
//! raw request values and serialize whatever it returns.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::geo::geodesic_distance;
use crate::presence::{PresenceDetector, Transition};
use crate::store::{AttendanceStore, SqliteStore};
use crate::{AttendanceRecord, Clock, Coordinate, SystemClock, TrackerConfig};

/// Result of checking a single reported location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    /// Meters between the reported location and the reference point.
    pub distance: f64,

    /// Whether `distance` is within the threshold.
    pub is_in_hostel: bool,

    /// The reference point.
    pub hostel_location: Coordinate,

    /// The reported location.
    pub current_location: Coordinate,

    /// What the check did to the caller's attendance.
    #[serde(skip)]
    pub transition: Transition,
}

/// Whether a user has been seen today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceStatus {
    #[serde(rename = "markedToday")]
    pub marked_today: bool,
}

/// Handles location checks and attendance queries for a single reference point.
pub struct AttendanceService<S = SqliteStore, C = SystemClock> {
    config: TrackerConfig,
    store: Arc<S>,
    detector: PresenceDetector<S, C>,
}

impl AttendanceService<SqliteStore, SystemClock> {
    /// Opens the SQLite store named in `config` and creates a service that uses the system clock.
    pub fn open(config: TrackerConfig) -> Result<AttendanceService> {
        let store = SqliteStore::open(&config.database_path)?;
        AttendanceService::with_store(config, store, SystemClock)
    }
}

impl<S: AttendanceStore, C: Clock> AttendanceService<S, C> {
    /// Creates a new `AttendanceService` on top of an existing store and clock.
    pub fn with_store(config: TrackerConfig, store: S, clock: C) -> Result<AttendanceService<S, C>> {
        let store = Arc::new(store);
        let detector = PresenceDetector::new(Arc::clone(&store), clock, config.threshold_meters)?;
        Ok(AttendanceService {
            config,
            store,
            detector,
        })
    }

    /// Get the configuration this service runs with
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Parses the reported location and runs [locate](AttendanceService::locate). Malformed input
    /// fails with a validation error before anything is written.
    pub fn check_location(
        &self,
        user_id: &str,
        latitude: &str,
        longitude: &str,
    ) -> Result<LocationReport> {
        let current = Coordinate::parse(latitude, longitude)?;
        self.locate(user_id, current)
    }

    /// Measures how far `current` is from the reference point and updates the attendance of
    /// `user_id` accordingly.
    pub fn locate(&self, user_id: &str, current: Coordinate) -> Result<LocationReport> {
        let distance = geodesic_distance(&current, &self.config.reference);
        log::debug!("{} is {:.2}m away at {}", user_id, distance, current);

        let transition = self.detector.observe(user_id, distance)?;

        Ok(LocationReport {
            distance,
            is_in_hostel: self.detector.is_within(distance),
            hostel_location: self.config.reference,
            current_location: current,
            transition,
        })
    }

    /// Returns whether `user_id` has entered at least once on the current day.
    pub fn attendance_status(&self, user_id: &str) -> Result<AttendanceStatus> {
        let today = self.detector.clock().today();
        let count = self.store.count_today(user_id, today)?;
        Ok(AttendanceStatus {
            marked_today: count > 0,
        })
    }

    /// Returns the whole attendance log, most recent entry first.
    pub fn attendance_data(&self) -> Result<Vec<AttendanceRecord>> {
        self.store.list_all()
    }
}
