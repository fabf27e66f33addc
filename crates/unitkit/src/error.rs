//! Error types for systemd operations.

use thiserror::Error;

/// Result type alias for systemd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from querying or driving systemd.
#[derive(Debug, Error)]
pub enum Error {
    /// Talking to the bus failed.
    #[error("dbus: {0}")]
    Dbus(#[from] zbus::Error),

    /// The unit is not loaded.
    #[error("unit {0:?} not found")]
    UnitNotFound(String),

    /// A job finished with a failing result word.
    #[error("failed to {verb} unit {unit:?}: job {result}")]
    Job {
        verb: &'static str,
        unit: String,
        result: String,
    },

    /// A job finished with a result word systemd does not document.
    #[error("unknown systemd status: {0}")]
    UnknownJobStatus(String),

    /// The job signal stream ended before the job finished.
    #[error("job channel closed before {verb} of {unit:?} completed")]
    JobChannelClosed { verb: &'static str, unit: String },

    /// A signal name or number outside 1..=31.
    #[error("invalid signal {0:?}")]
    InvalidSignal(String),

    /// Filesystem access during the enablement walk.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure came from the unit rather than the transport.
    #[must_use]
    pub fn is_job_failure(&self) -> bool {
        matches!(self, Self::Job { .. } | Self::UnknownJobStatus(_))
    }
}
