//! Error types for backend lifecycle operations.

use thiserror::Error;

/// Errors that can occur while bringing the inference backend up or down.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// HTTP probe failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server is not running or not reachable.
    #[error("Backend not running at {0}. Start it with: dwight backend start")]
    NotRunning(String),

    /// An external command (e.g. `docker`) exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// I/O error, usually a missing `docker` binary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for the server to answer after starting it.
    #[error("Timeout waiting for backend to become ready")]
    StartTimeout,
}
