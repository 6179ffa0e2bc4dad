//! Error types for config loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a config layer from disk failed.
    #[error("failed to read config layer {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A layer is not valid JSON5.
    #[error("failed to parse config layer {label}: {source}")]
    Parse {
        label: String,
        #[source]
        source: json5::Error,
    },
    /// The merged document does not decode into the config model.
    #[error("failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),
    /// A specific field failed schema validation.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// A value is well-typed but outside its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
