//! Error types for commerce-migrate.
//!
//! Every variant carries a `MIG-XXX` code so operators can match log lines
//! to the failing layer (config, source, target, mapping store).

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (MIG-001).
    #[error("[MIG-001] Configuration error: {0}")]
    Config(String),

    /// Source connection or query failure (MIG-002).
    #[error("[MIG-002] Source error: {0}")]
    SourceConnection(String),

    /// A source row could not be decoded (MIG-003).
    #[error("[MIG-003] Extraction error: {0}")]
    Extraction(String),

    /// Target write or lookup failure (MIG-004).
    #[error("[MIG-004] Target error: {0}")]
    Target(String),

    /// Mapping store failure (MIG-005).
    #[error("[MIG-005] Mapping store error: {0}")]
    Mapping(String),

    /// Checkpoint could not be read or written (MIG-006).
    #[error("[MIG-006] Checkpoint error: {0}")]
    Checkpoint(String),

    /// A step finished in the error state (MIG-007).
    #[error("[MIG-007] Step '{step}' failed: {message}")]
    StepFailed {
        /// Step that failed.
        step: String,
        /// Message reported by the adapter.
        message: String,
    },

    /// IO error (MIG-008).
    #[error("[MIG-008] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error (MIG-009).
    #[error("[MIG-009] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error (MIG-010).
    #[error("[MIG-010] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQL error from the mapping database (MIG-011).
    #[cfg(feature = "sqlite")]
    #[error("[MIG-011] Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Returns the error code (e.g., "MIG-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "MIG-001",
            Self::SourceConnection(_) => "MIG-002",
            Self::Extraction(_) => "MIG-003",
            Self::Target(_) => "MIG-004",
            Self::Mapping(_) => "MIG-005",
            Self::Checkpoint(_) => "MIG-006",
            Self::StepFailed { .. } => "MIG-007",
            Self::Io(_) => "MIG-008",
            Self::Json(_) => "MIG-009",
            Self::Yaml(_) => "MIG-010",
            #[cfg(feature = "sqlite")]
            Self::Database(_) => "MIG-011",
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::SourceConnection(msg) | Self::Target(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("connection refused")
                    || msg.contains("connection reset")
                    || msg.contains("temporar")
                    || msg.contains("deadlock")
            }
            #[cfg(feature = "sqlite")]
            Self::Database(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            _ => false,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
