//! Error types for Horizon Hilite.

use thiserror::Error;

/// The main error type for Horizon Hilite operations.
///
/// Only recoverable conditions are represented here. Listener failures are
/// isolated and logged inside the notification dispatch and never surface
/// as errors.
#[derive(Debug, Error)]
pub enum HiliteError {
    /// A persisted hilite mapping document is structurally invalid.
    ///
    /// The caller decides whether to continue with an empty mapping or
    /// abort; the rest of the propagation network is unaffected.
    #[error("invalid hilite mapping settings: {0}")]
    InvalidSettings(String),

    /// A mapping document could not be parsed as JSON.
    #[error("malformed mapping document: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a mapping file failed.
    #[error("mapping file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for Horizon Hilite operations.
pub type Result<T> = std::result::Result<T, HiliteError>;
