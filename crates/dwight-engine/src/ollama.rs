//! Ollama HTTP API client: registry listing, model pulls and chat.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BackendError, ChatError, PullError};
use crate::settings::DEFAULT_CHAT_TIMEOUT_SECS;
use crate::stream::{consume_stream, parse_reply, LineBuffer};
use crate::types::{ChatReply, ChatRequest};

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Timeout for registry listings.
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Ollama API client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    chat_timeout: Duration,
}

/// An entry of the `/api/tags` listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    /// Size on disk in bytes.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

/// One progress record streamed by `/api/pull`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// True if some registry name starts with `model`. Case-sensitive, so a bare
/// `llama3.2` matches `llama3.2:3b`.
pub fn model_present<S: AsRef<str>>(names: &[S], model: &str) -> bool {
    names.iter().any(|name| name.as_ref().starts_with(model))
}

impl OllamaClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
        }
    }

    /// Set the whole-request timeout for chat calls, streamed bodies included.
    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_timeout(&self) -> Duration {
        self.chat_timeout
    }

    fn unreachable(&self, err: reqwest::Error) -> BackendError {
        BackendError::Unreachable {
            url: self.base_url.clone(),
            reason: err.to_string(),
        }
    }

    /// List installed models.
    pub async fn list_models(&self) -> Result<Vec<InstalledModel>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, body });
        }

        let tags: TagsResponse = response.json().await.map_err(BackendError::Decode)?;
        debug!(count = tags.models.len(), "Listed installed models");
        Ok(tags.models)
    }

    /// Whether a model matching `model` is installed.
    pub async fn is_model_present(&self, model: &str) -> Result<bool, BackendError> {
        let models = self.list_models().await?;
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        Ok(model_present(&names, model))
    }

    /// Ask the backend to pull `model` and drain the progress body.
    ///
    /// A rejected request or an `error` record fails the pull. A body that
    /// breaks off is only logged; completion is confirmed by polling the
    /// registry.
    pub async fn start_pull(&self, model: &str) -> Result<(), PullError> {
        let response = self.send_pull(model).await?;
        let failed = |reason: String| PullError::Failed {
            model: model.to_string(),
            reason,
        };

        let mut ignore = |_: &PullProgress| {};
        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut last_status = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(model, error = %e, "Pull body ended early");
                    return Ok(());
                }
            };
            for line in lines.push(&chunk) {
                handle_pull_line(&line, &mut ignore, &mut last_status).map_err(failed)?;
            }
        }
        if let Some(rest) = lines.finish() {
            handle_pull_line(&rest, &mut ignore, &mut last_status).map_err(failed)?;
        }

        debug!(model, status = %last_status, "Pull request drained");
        Ok(())
    }

    /// Pull `model`, reporting each progress record as it arrives.
    ///
    /// Returns the last status line, normally `success`.
    pub async fn pull_with_progress<F>(&self, model: &str, mut on_progress: F) -> Result<String, PullError>
    where
        F: FnMut(&PullProgress),
    {
        let response = self.send_pull(model).await?;
        let failed = |reason: String| PullError::Failed {
            model: model.to_string(),
            reason,
        };

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut last_status = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            for line in lines.push(&chunk) {
                handle_pull_line(&line, &mut on_progress, &mut last_status).map_err(failed)?;
            }
        }
        if let Some(rest) = lines.finish() {
            handle_pull_line(&rest, &mut on_progress, &mut last_status).map_err(failed)?;
        }

        info!(model, status = %last_status, "Pull finished");
        Ok(last_status)
    }

    async fn send_pull(&self, model: &str) -> Result<reqwest::Response, PullError> {
        let url = format!("{}/api/pull", self.base_url);
        info!(model, "Requesting model pull");

        let response = self
            .client
            .post(&url)
            .json(&PullRequest { name: model })
            .send()
            .await
            .map_err(|e| PullError::Failed {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PullError::Failed {
                model: model.to_string(),
                reason: format!("{}: {}", status, body),
            });
        }
        Ok(response)
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.chat_timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }
        Ok(response)
    }

    /// Non-streaming chat: one JSON body.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let response = self.send_chat(request).await?;
        let body = response.bytes().await?;
        parse_reply(&body)
    }

    /// Streaming chat. `on_delta` sees every content fragment in order.
    pub async fn chat_stream<F>(&self, request: &ChatRequest, on_delta: F) -> Result<ChatReply, ChatError>
    where
        F: FnMut(&str),
    {
        let response = self.send_chat(request).await?;
        consume_stream(response.bytes_stream(), on_delta).await
    }
}

/// Decode one pull record. An `error` record comes back as `Err(reason)`.
fn handle_pull_line<F>(line: &[u8], on_progress: &mut F, last_status: &mut String) -> Result<(), String>
where
    F: FnMut(&PullProgress),
{
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let progress: PullProgress = match serde_json::from_slice(line) {
        Ok(progress) => progress,
        Err(e) => {
            debug!(error = %e, "Skipping malformed pull record");
            return Ok(());
        }
    };
    if let Some(error) = progress.error {
        return Err(error);
    }
    on_progress(&progress);
    *last_status = progress.status;
    Ok(())
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestMessage, Role};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(stream: bool) -> ChatRequest {
        ChatRequest {
            model: "llama3.2:3b".to_string(),
            messages: vec![RequestMessage::new(Role::User, "hello")],
            temperature: 0.8,
            stream,
        }
    }

    #[test]
    fn test_model_present_prefix() {
        let names = ["llama3.2:3b", "qwen2.5-coder:7b"];
        assert!(model_present(&names, "llama3.2:3b"));
        assert!(model_present(&names, "llama3.2"));
        assert!(model_present(&names, "qwen2.5-coder"));
        assert!(!model_present(&names, "Llama3.2"));
        assert!(!model_present(&names, "mistral"));
        assert!(!model_present::<&str>(&[], "llama3.2"));
    }

    #[test]
    fn test_default_client() {
        let client = OllamaClient::default();
        assert_eq!(client.base_url(), DEFAULT_OLLAMA_URL);
        assert_eq!(client.chat_timeout(), Duration::from_secs(180));

        let client = OllamaClient::new("http://gpu-box:11434/").with_chat_timeout(Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://gpu-box:11434");
        assert_eq!(client.chat_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {"name": "llama3.2:3b", "size": 2019393189u64, "modified_at": "2024-10-01T12:00:00Z"},
                    {"name": "qwen2.5-coder:7b"}
                ]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let models = client.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].size, 2019393189);
        assert_eq!(models[1].size, 0);

        assert!(client.is_model_present("llama3.2").await.unwrap());
        assert!(!client.is_model_present("mistral").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_models_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_list_models_unreachable() {
        let client = OllamaClient::new("http://127.0.0.1:9");
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, BackendError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_pull_with_progress() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"status\":\"pulling manifest\"}\n",
            "{\"status\":\"downloading\",\"digest\":\"sha256:abc\",\"total\":100,\"completed\":40}\n",
            "garbage\n",
            "{\"status\":\"downloading\",\"digest\":\"sha256:abc\",\"total\":100,\"completed\":100}\n",
            "{\"status\":\"success\"}"
        );
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(json!({"name": "llama3.2:3b"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let mut seen = Vec::new();
        let status = client
            .pull_with_progress("llama3.2:3b", |p| seen.push(p.clone()))
            .await
            .unwrap();

        assert_eq!(status, "success");
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1].completed, Some(40));
        assert_eq!(seen[2].total, Some(100));
    }

    #[tokio::test]
    async fn test_pull_error_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"status\":\"pulling manifest\"}\n{\"error\":\"file does not exist\"}\n"),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.pull_with_progress("nope", |_| {}).await.unwrap_err();
        assert!(matches!(err, PullError::Failed { reason, .. } if reason == "file does not exist"));
    }

    #[tokio::test]
    async fn test_start_pull_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.start_pull("llama3.2:3b").await.unwrap_err();
        assert!(matches!(err, PullError::Failed { reason, .. } if reason.contains("disk full")));
    }

    #[tokio::test]
    async fn test_chat_non_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.2:3b",
                "stream": false,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "Hello!"},
                "done": true,
                "prompt_eval_count": 5,
                "eval_count": 2
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let reply = client.chat(&request(false)).await.unwrap();
        assert_eq!(reply.content, "Hello!");
        assert_eq!(reply.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_chat_streaming() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"content\":\"He\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"llo!\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true,\"prompt_eval_count\":5,\"eval_count\":2}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let mut deltas = String::new();
        let reply = client
            .chat_stream(&request(true), |d| deltas.push_str(d))
            .await
            .unwrap();

        assert_eq!(deltas, "Hello!");
        assert_eq!(reply.content, "Hello!");
        assert_eq!(reply.prompt_tokens, 5);
        assert_eq!(reply.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_chat_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.chat(&request(false)).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 404, .. }));
    }
}
