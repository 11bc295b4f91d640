//! Reachability probe for an Ollama-compatible server.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::LifecycleError;

/// Probes `GET /api/tags` to decide whether the server is answering.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HealthProbe {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check once whether the server is up.
    pub async fn check(&self) -> Result<(), LifecycleError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    LifecycleError::NotRunning(self.base_url.clone())
                } else {
                    LifecycleError::Http(e)
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LifecycleError::NotRunning(self.base_url.clone()))
        }
    }

    /// Poll until the server answers or `timeout` elapses.
    pub async fn wait_ready(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), LifecycleError> {
        let start = Instant::now();

        info!("Waiting for backend at {} to become ready...", self.base_url);

        while start.elapsed() < timeout {
            match self.check().await {
                Ok(()) => {
                    info!("Backend is ready");
                    return Ok(());
                }
                Err(e) => {
                    debug!("Backend not ready yet: {}", e);
                    sleep(interval).await;
                }
            }
        }

        Err(LifecycleError::StartTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_trailing_slash_trimmed() {
        let probe = HealthProbe::new("http://localhost:11434/");
        assert_eq!(probe.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_check_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models":[]}"#))
            .mount(&server)
            .await;

        let probe = HealthProbe::new(server.uri());
        assert!(probe.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_check_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HealthProbe::new(server.uri());
        assert!(matches!(
            probe.check().await,
            Err(LifecycleError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out() {
        // Nothing listens on port 9 locally.
        let probe = HealthProbe::new("http://127.0.0.1:9");
        let result = probe
            .wait_ready(Duration::from_millis(50), Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(LifecycleError::StartTimeout)));
    }
}
