//! # Dwight Chat Engine
//!
//! Orchestrates chat sessions against a local Ollama backend: makes sure the
//! requested model is installed (pulling it if the user agrees), sends turns,
//! consumes streamed replies, keeps history inside the model's context window
//! and stores conversations on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Job   ┌──────────────┐  HTTP  ┌──────────────┐
//! │   Session    │ -----> │ spawned task │ -----> │    Ollama    │
//! │ (state mach.)│ <----- │ (tokio)      │ <----- │   backend    │
//! └──────────────┘ Event  └──────────────┘  NDJSON└──────────────┘
//!        │
//!  ┌─────┴──────┐
//!  │   Store    │  one JSON file per conversation
//!  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use dwight_engine::{ChatEngine, EngineConfig, Update};
//!
//! let mut engine = ChatEngine::from_config(&EngineConfig::from_env())?;
//! engine.open()?;
//! engine.run_until_idle(|_| {}).await;
//!
//! engine.submit("hello")?;
//! engine
//!     .run_until_idle(|update| {
//!         if let Update::Delta(text) = update {
//!             print!("{}", text);
//!         }
//!     })
//!     .await;
//! ```

mod availability;
mod config;
pub mod context;
mod engine;
mod error;
mod export;
pub mod library;
mod ollama;
pub mod paths;
mod profiles;
mod prompt;
mod resources;
mod session;
mod settings;
mod store;
pub mod stream;
mod types;

pub use availability::{Availability, PullPolicy, DEFAULT_PULL_DEADLINE, DEFAULT_PULL_INTERVAL};
pub use config::{BackendKind, EngineConfig, EngineConfigBuilder};
pub use context::{trim_to_context, ContextUsage};
pub use engine::ChatEngine;
pub use error::{
    BackendError, ChatError, ConfigError, EngineError, PullError, SessionError, StoreError, ValidationError,
};
pub use export::{export_file_name, render_json, render_markdown, render_text, ExportFormat};
pub use library::{filter_library, mark_installed, popular_models, LibraryModel};
pub use ollama::{model_present, InstalledModel, OllamaClient, PullProgress, DEFAULT_OLLAMA_URL};
pub use profiles::{default_profiles, ModelProfile, ProfileSet};
pub use prompt::{assemble_request, Attachment};
pub use resources::{load_attachments, FsResourceReader, ResourceReader};
pub use session::{ChatState, Job, Session, SessionEvent, StateKind, Update};
pub use settings::{AppSettings, DEFAULT_CHAT_TIMEOUT_SECS};
pub use store::{derive_title, new_conversation_id, Conversation, ConversationMetadata, ConversationStore};
pub use types::{ChatMessage, ChatReply, ChatRequest, RequestMessage, Role};
