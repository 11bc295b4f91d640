//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dwight_backend::{BackendLifecycle, DockerBackend, ExternalBackend};
use tracing::warn;

use crate::availability::PullPolicy;
use crate::ollama::DEFAULT_OLLAMA_URL;
use crate::paths;

/// How the backend process is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Somebody else runs the server; we only probe it.
    External,
    /// We run the `ollama/ollama` container through Docker.
    Docker,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "external" => Some(BackendKind::External),
            "docker" => Some(BackendKind::Docker),
            _ => None,
        }
    }
}

/// Configuration for the chat engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend API base URL
    pub base_url: String,
    /// Root of settings, profiles, conversations and exports
    pub data_dir: PathBuf,
    /// Stream replies record by record
    pub stream: bool,
    pub backend: BackendKind,
    /// Pull-and-poll cadence and deadline
    pub pull: PullPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            data_dir: paths::default_data_dir(),
            stream: true,
            backend: BackendKind::External,
            pull: PullPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("DWIGHT_OLLAMA_URL").unwrap_or(defaults.base_url);

        let data_dir = std::env::var("DWIGHT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let stream = std::env::var("DWIGHT_STREAM")
            .map(|v| !(v == "0" || v.to_lowercase() == "false"))
            .unwrap_or(true);

        let backend = std::env::var("DWIGHT_BACKEND")
            .ok()
            .and_then(|v| BackendKind::parse(&v))
            .unwrap_or(BackendKind::External);

        Self {
            base_url,
            data_dir,
            stream,
            backend,
            pull: defaults.pull,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The lifecycle collaborator selected by `backend`.
    pub fn lifecycle(&self) -> Arc<dyn BackendLifecycle> {
        match self.backend {
            BackendKind::External => Arc::new(ExternalBackend::new(self.base_url.clone())),
            BackendKind::Docker => Arc::new(self.docker_backend()),
        }
    }

    /// A container manager publishing on the port of `base_url`.
    fn docker_backend(&self) -> DockerBackend {
        let backend = DockerBackend::new();
        match reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.port_or_known_default())
        {
            Some(port) => backend.with_port(port),
            None => {
                warn!(url = %self.base_url, "Cannot derive a port from the base URL, using the default");
                backend
            }
        }
    }
}

/// Builder for engine configuration.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.config.stream = stream;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn pull_interval(mut self, interval: Duration) -> Self {
        self.config.pull.interval = interval;
        self
    }

    pub fn pull_deadline(mut self, deadline: Duration) -> Self {
        self.config.pull.deadline = deadline;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert!(config.stream);
        assert_eq!(config.backend, BackendKind::External);
        assert_eq!(config.pull.interval, Duration::from_secs(10));
        assert_eq!(config.pull.deadline, Duration::from_secs(600));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .base_url("http://gpu-box:11434")
            .data_dir("/tmp/dwight")
            .stream(false)
            .backend(BackendKind::Docker)
            .pull_interval(Duration::from_millis(5))
            .build();
        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/dwight"));
        assert!(!config.stream);
        assert_eq!(config.backend, BackendKind::Docker);
        assert_eq!(config.pull.interval, Duration::from_millis(5));
    }

    #[test]
    fn test_docker_port_follows_base_url() {
        let config = EngineConfig::builder()
            .base_url("http://localhost:9999")
            .backend(BackendKind::Docker)
            .build();
        assert_eq!(config.docker_backend().port(), 9999);
        assert_eq!(config.docker_backend().base_url(), "http://localhost:9999");

        let config = EngineConfig::default();
        assert_eq!(config.docker_backend().port(), 11434);

        let config = EngineConfig::builder().base_url("not a url").build();
        assert_eq!(config.docker_backend().port(), 11434);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("Docker"), Some(BackendKind::Docker));
        assert_eq!(BackendKind::parse("external"), Some(BackendKind::External));
        assert_eq!(BackendKind::parse("k8s"), None);
    }
}
