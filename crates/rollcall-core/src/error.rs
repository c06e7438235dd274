//! Error types for Rollcall core library.

use thiserror::Error;

/// Result type alias using Rollcall Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Rollcall operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown enum value on the wire or in storage
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
