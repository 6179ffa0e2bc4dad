//! Error types for the focusync core crate.

use focusync_config::ConfigError;
use focusync_remote::RemoteError;
use thiserror::Error;

use crate::snapshot::SnapshotError;

/// Errors returned by store and service operations.
#[derive(Debug, Error)]
pub enum FocusyncError {
    /// Operation needs an authenticated owner.
    #[error("no owner is signed in")]
    SignedOut,
    /// Record id is unknown to the local cache.
    #[error("unknown record: {0}")]
    UnknownRecord(String),
    /// Remote store call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    /// Local snapshot could not be read or written.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// LLM provider could not be built.
    #[error("llm error: {0}")]
    Llm(String),
    /// Rejected input.
    #[error("invalid input: {0}")]
    Invalid(String),
}
