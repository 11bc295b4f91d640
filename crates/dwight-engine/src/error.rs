//! Error taxonomy for the orchestration engine.
//!
//! A missing model is not an error: it is the `ModelNotAvailable` session
//! state. Per-record stream parse failures are skipped where they happen and
//! never show up here.

use std::time::Duration;
use thiserror::Error;

use crate::session::StateKind;

/// Failures talking to the backend's model registry.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure, or the lifecycle collaborator could not bring
    /// the service up.
    #[error("backend not reachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid registry response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Failures of the pull-and-poll procedure.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("pull of '{model}' failed: {reason}")]
    Failed { model: String, reason: String },

    #[error("model '{model}' did not appear within {waited:?}")]
    Timeout { model: String, waited: Duration },
}

/// Failures of a chat request, streaming or not.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend reported an error: {0}")]
    Backend(String),

    #[error("invalid response body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response stream ended before the final record")]
    StreamTruncated,
}

/// Conversation persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),

    #[error("invalid conversation id '{0}'")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings and profile file failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Input rejected locally, before any request is issued.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("profile index {index} out of range (have {len})")]
    ProfileOutOfRange { index: usize, len: usize },

    #[error("temperature {0} outside 0.0..=1.0")]
    TemperatureOutOfRange(f32),

    #[error("cannot remove the last profile")]
    LastProfile,

    #[error("no messages to save")]
    NothingToSave,

    #[error("unknown export format '{0}' (expected md, json or txt)")]
    UnknownExportFormat(String),
}

/// An operation that the current session state does not allow.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: StateKind,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Umbrella error for engine-level operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Pull(#[from] PullError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Session(SessionError::Validation(err))
    }
}
