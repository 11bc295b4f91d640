//! Inference backend lifecycle for Dwight.
//!
//! The chat engine only needs the backend to be reachable. This crate
//! provides the [`BackendLifecycle`] contract plus two implementations:
//! one for a server somebody else runs, one that manages an Ollama
//! container through the `docker` CLI.

mod docker;
mod error;
mod lifecycle;
mod probe;

pub use docker::DockerBackend;
pub use error::LifecycleError;
pub use lifecycle::{BackendLifecycle, ExternalBackend};
pub use probe::HealthProbe;

/// Default port the Ollama API listens on.
pub const DEFAULT_PORT: u16 = 11434;

/// Default Docker image for the managed backend.
pub const DEFAULT_IMAGE: &str = "ollama/ollama";

/// Default container name for the managed backend.
pub const DEFAULT_CONTAINER_NAME: &str = "ollama";
