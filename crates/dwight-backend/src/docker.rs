//! Docker-managed Ollama container.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::LifecycleError;
use crate::lifecycle::BackendLifecycle;
use crate::probe::HealthProbe;
use crate::{DEFAULT_CONTAINER_NAME, DEFAULT_IMAGE, DEFAULT_PORT};

/// Manager for an `ollama/ollama` container driven through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    container: String,
    image: String,
    port: u16,
    volume: String,
    ready_timeout: Duration,
}

impl DockerBackend {
    /// Create a manager with default container name, image and port.
    pub fn new() -> Self {
        Self {
            container: DEFAULT_CONTAINER_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            port: DEFAULT_PORT,
            volume: "ollama".to_string(),
            ready_timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom host port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set a custom container name.
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.container = name.into();
        self
    }

    /// Set how long to wait for the API after starting the container.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Get the port this container publishes.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the API served by the container.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Arguments for creating the container from scratch.
    fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.container.clone(),
            "-p".to_string(),
            format!("{}:11434", self.port),
            "-v".to_string(),
            format!("{}:/root/.ollama", self.volume),
            self.image.clone(),
        ]
    }

    async fn ensure_image(&self) -> Result<(), LifecycleError> {
        let images = docker(&["images", &self.image, "--format", "{{.Repository}}"]).await?;
        if images.contains(&self.image) {
            return Ok(());
        }

        info!("Pulling Docker image {}", self.image);
        docker(&["pull", &self.image]).await?;
        Ok(())
    }

    async fn container_listed(&self, all: bool) -> Result<bool, LifecycleError> {
        let filter = format!("name={}", self.container);
        let mut args = vec!["ps"];
        if all {
            args.push("-a");
        }
        args.extend(["--filter", filter.as_str(), "--format", "{{.Names}}"]);

        let names = docker(&args).await?;
        Ok(names.lines().any(|line| line.trim() == self.container))
    }
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendLifecycle for DockerBackend {
    async fn ensure_running(&self) -> Result<(), LifecycleError> {
        self.ensure_image().await?;

        if self.container_listed(false).await? {
            debug!("Container {} already running", self.container);
        } else if self.container_listed(true).await? {
            info!("Starting stopped container {}", self.container);
            docker(&["start", &self.container]).await?;
        } else {
            info!(
                "Creating container {} on port {}",
                self.container, self.port
            );
            let args = self.run_args();
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            docker(&args).await?;
        }

        HealthProbe::new(self.base_url())
            .wait_ready(self.ready_timeout, Duration::from_millis(500))
            .await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        info!("Stopping container {}", self.container);
        docker(&["stop", &self.container]).await?;
        Ok(())
    }
}

/// Run `docker <args>` and return its stdout.
async fn docker(args: &[&str]) -> Result<String, LifecycleError> {
    debug!("docker {}", args.join(" "));

    let output = Command::new("docker").args(args).output().await?;

    if !output.status.success() {
        return Err(LifecycleError::CommandFailed {
            command: format!("docker {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let backend = DockerBackend::new();
        assert_eq!(backend.port(), 11434);
        assert_eq!(backend.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_run_args() {
        let backend = DockerBackend::new()
            .with_port(9999)
            .with_container("dwight-ollama");
        assert_eq!(
            backend.run_args(),
            vec![
                "run",
                "-d",
                "--name",
                "dwight-ollama",
                "-p",
                "9999:11434",
                "-v",
                "ollama:/root/.ollama",
                "ollama/ollama",
            ]
        );
    }
}
