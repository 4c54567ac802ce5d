use thiserror::Error;

/// Errors produced by the synchronization engine.
///
/// Only `RemoteUnavailable` and `NotAuthenticated` are meant to reach the user;
/// the rest are recovered locally or logged by the component that saw them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A raw catalog record could not be normalized. Batch-local: the record is dropped.
    #[error("malformed {game} record: {reason}")]
    MalformedRecord { game: String, reason: String },

    /// A row or entry that was expected to exist does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote backend failed or did not answer within the configured timeout.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// No owner id in the current session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// An async reconciliation finished after its container/game context changed.
    #[error("stale operation for {container_id}/{game}")]
    StaleOperation { container_id: String, game: String },

    /// Local durable storage failure (includes poisoned locks).
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl SyncError {
    /// Errors the user can recover from by re-triggering the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::NotAuthenticated
        )
    }

    pub(crate) fn malformed(game: impl ToString, reason: impl Into<String>) -> Self {
        SyncError::MalformedRecord {
            game: game.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serde(err.to_string())
    }
}

impl From<bitcode::Error> for SyncError {
    fn from(err: bitcode::Error) -> Self {
        SyncError::Serde(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
