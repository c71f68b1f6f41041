use thiserror::Error;

/// Errors that can occur while checking a location or touching the attendance log.
///
/// Storage errors are forwarded from SQLite, everything else is raised by this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AttendanceError {
    /// A coordinate or configuration value was malformed or out of range.
    #[error("{0}")]
    Validation(String),

    /// A timestamp read back from the store did not match the stored text format.
    #[error("malformed timestamp {value:?}: {reason}")]
    Format {
        /// The offending text as it was stored.
        value: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// There is no attendance record with the given id.
    #[error("attendance record {0} not found")]
    NotFound(i64),

    /// The attendance record was closed before and must not change anymore.
    #[error("attendance record {0} is already closed")]
    AlreadyClosed(i64),

    /// Something went wrong inside SQLite.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    /// Could not prepare the location of the database file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled before finishing.
    #[error("worker failed: {0}")]
    Task(String),
}

impl AttendanceError {
    /// Returns `true` for errors caused by the caller's input rather than by the server.
    pub fn is_validation(&self) -> bool {
        matches!(self, AttendanceError::Validation(_))
    }
}

/// Shorthand for results carrying an [AttendanceError](AttendanceError).
pub type Result<T> = std::result::Result<T, AttendanceError>;
