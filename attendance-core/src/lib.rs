//! Location based attendance tracking.
//!
//! A client periodically reports where it is. The [AttendanceService](crate::AttendanceService)
//! measures the [geodesic distance](crate::geo::geodesic_distance) to a fixed reference point and
//! feeds it to a [PresenceDetector](crate::presence::PresenceDetector), which opens an
//! [AttendanceRecord](crate::AttendanceRecord) when the client comes within the threshold and
//! closes it again when the client leaves. Records are kept in an
//! [AttendanceStore](crate::store::AttendanceStore).
//!
//! Use a [Transport](crate::transport::Transport) to serve the service, for example the
//! [HyperHttpTransport](crate::transport::hyper::HyperHttpTransport):
//!
//! ```no_run
//! use attendance::transport::hyper::HyperHttpTransport;
//! use attendance::transport::Transport;
//! use attendance::{AttendanceService, TrackerConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let service = AttendanceService::open(TrackerConfig::default())?;
//!     let transport = HyperHttpTransport::new("0.0.0.0:5000".parse()?);
//!     transport.run(service)?;
//!     Ok(())
//! }
//! ```

pub use config::TrackerConfig;
pub use coordinate::Coordinate;
pub use error::{AttendanceError, Result};
pub use presence::{PresenceDetector, PresenceState, Transition};
pub use record::AttendanceRecord;
pub use service::{AttendanceService, AttendanceStatus, LocationReport};
pub use timestamp::{Clock, StoredTime, SystemClock, Timestamp};

pub mod config;
mod coordinate;
mod error;
pub mod geo;
pub mod presence;
mod record;
mod service;
pub mod store;
mod timestamp;
pub mod transport;
