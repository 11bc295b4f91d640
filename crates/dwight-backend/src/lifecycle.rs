//! The lifecycle contract the chat engine relies on.

use async_trait::async_trait;
use tracing::debug;

use crate::error::LifecycleError;
use crate::probe::HealthProbe;

/// Something that can make the inference backend reachable and shut it down.
#[async_trait]
pub trait BackendLifecycle: Send + Sync {
    /// Make sure the backend answers HTTP requests, starting it if needed.
    async fn ensure_running(&self) -> Result<(), LifecycleError>;

    /// Stop the backend to free its resources.
    async fn stop(&self) -> Result<(), LifecycleError>;
}

/// A backend started and stopped by someone else (e.g. `ollama serve`).
///
/// `ensure_running` only probes; `stop` is a no-op.
#[derive(Debug, Clone)]
pub struct ExternalBackend {
    probe: HealthProbe,
}

impl ExternalBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            probe: HealthProbe::new(base_url),
        }
    }
}

#[async_trait]
impl BackendLifecycle for ExternalBackend {
    async fn ensure_running(&self) -> Result<(), LifecycleError> {
        self.probe.check().await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        debug!(
            "Backend at {} is externally managed, not stopping",
            self.probe.base_url()
        );
        Ok(())
    }
}
