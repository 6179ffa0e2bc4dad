//! Errors surfaced by remote store implementations.

use thiserror::Error;

/// Failure talking to the remote document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or service outage; the call may succeed later.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// The store refused the request (permissions, invalid payload).
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}
