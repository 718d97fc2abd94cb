//! Error types for the xlfmt client.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the xlfmt client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to spawn WINE bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host's persisted dispatch bindings no longer match the installed
    /// Excel. Recovered automatically once during [`Session::open`];
    /// propagated if the retry fails too.
    ///
    /// [`Session::open`]: crate::Session::open
    #[error("Stale dispatch bindings: {0}")]
    StaleBindings(String),

    /// Any other failure reported by the host application (missing file,
    /// invalid range address, Excel unavailable, ...).
    #[error("Host application error: {0}")]
    Host(String),

    #[error("Unexpected response data")]
    UnexpectedResponse,

    /// The session was closed; the workbook handle is no longer valid.
    #[error("Session is closed; the workbook handle is no longer valid")]
    SessionClosed,

    #[error("Failed to clear binding cache at {path}: {source}")]
    CacheClear {
        path: PathBuf,
        source: std::io::Error,
    },
}
