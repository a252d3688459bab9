use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("replication failed: {0}")]
    ReplicationFailed(String),

    #[error("timed out after {after:?}: {what}")]
    Timeout { what: String, after: Duration },

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Whether the API reported that the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}
