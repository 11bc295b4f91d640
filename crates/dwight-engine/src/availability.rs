//! Availability and pull controller.
//!
//! Makes sure the backend is up, answers whether a model is installed and
//! drives the pull-and-poll procedure. It never touches session state; the
//! caller turns results into transitions.

use std::sync::Arc;
use std::time::Duration;

use dwight_backend::BackendLifecycle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::{BackendError, PullError};
use crate::ollama::OllamaClient;

/// Registry poll cadence while a pull runs.
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(10);

/// Overall bound on a pull, initiating request included.
pub const DEFAULT_PULL_DEADLINE: Duration = Duration::from_secs(600);

/// Poll cadence and overall deadline for [`Availability::pull_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PullPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PULL_INTERVAL,
            deadline: DEFAULT_PULL_DEADLINE,
        }
    }
}

#[derive(Clone)]
pub struct Availability {
    client: OllamaClient,
    lifecycle: Arc<dyn BackendLifecycle>,
    policy: PullPolicy,
}

impl Availability {
    pub fn new(client: OllamaClient, lifecycle: Arc<dyn BackendLifecycle>, policy: PullPolicy) -> Self {
        Self {
            client,
            lifecycle,
            policy,
        }
    }

    pub fn policy(&self) -> PullPolicy {
        self.policy
    }

    /// Ask the lifecycle collaborator to bring the backend up.
    pub async fn ensure_backend_reachable(&self) -> Result<(), BackendError> {
        self.lifecycle.ensure_running().await.map_err(|e| {
            warn!(url = %self.client.base_url(), error = %e, "Backend unreachable");
            BackendError::Unreachable {
                url: self.client.base_url().to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub async fn is_model_present(&self, model: &str) -> Result<bool, BackendError> {
        self.client.is_model_present(model).await
    }

    /// `ensure_backend_reachable` followed by `is_model_present`.
    pub async fn check_model(&self, model: &str) -> Result<bool, BackendError> {
        self.ensure_backend_reachable().await?;
        let present = self.is_model_present(model).await?;
        debug!(model, present, "Checked model availability");
        Ok(present)
    }

    /// Pull `model` and poll the registry until it shows up.
    ///
    /// Failed polls are retried until the deadline. A rejected initiating
    /// request fails immediately.
    pub async fn pull_model(&self, model: &str) -> Result<(), PullError> {
        let started = Instant::now();
        let deadline = started + self.policy.deadline;
        let timed_out = || PullError::Timeout {
            model: model.to_string(),
            waited: started.elapsed(),
        };

        match timeout(self.policy.deadline, self.client.start_pull(model)).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out()),
        }

        loop {
            match self.client.is_model_present(model).await {
                Ok(true) => {
                    info!(model, elapsed = ?started.elapsed(), "Model available after pull");
                    return Ok(());
                }
                Ok(false) => debug!(model, "Model not listed yet"),
                Err(e) => debug!(model, error = %e, "Registry poll failed, retrying"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(model, "Pull deadline reached");
                return Err(timed_out());
            }
            sleep(self.policy.interval.min(deadline - now)).await;
        }
    }
}
