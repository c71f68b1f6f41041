//! Transports expose an [AttendanceService](crate::AttendanceService) to clients.

use crate::store::AttendanceStore;
use crate::{AttendanceService, Clock};

pub mod hyper;

/// Serves an [AttendanceService](crate::AttendanceService) until shut down.
pub trait Transport {
    /// Runs the transport, blocking the calling thread.
    fn run<S, C>(self, service: AttendanceService<S, C>) -> anyhow::Result<()>
    where
        S: AttendanceStore + 'static,
        C: Clock + 'static;
}
