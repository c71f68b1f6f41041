use serde::Serialize;

use crate::StoredTime;

/// One stay of a user within the threshold of the reference point.
///
/// A record is *open* while `exit_time` is `None`. Once closed, `exit_time` and `duration` are
/// both set and the record is never touched again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    /// Row id assigned by the store.
    pub id: i64,

    /// Opaque caller identity. Currently the caller's network address, which conflates everyone
    /// behind the same NAT into one user.
    pub user_id: String,

    /// When presence was first detected.
    pub entry_time: StoredTime,

    /// When presence ended, `None` while the user is still present.
    pub exit_time: Option<StoredTime>,

    /// Seconds between entry and exit, `None` while the user is still present.
    pub duration: Option<f64>,
}

impl AttendanceRecord {
    /// Returns `true` if this record has not been closed yet.
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }
}
