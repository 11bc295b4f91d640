//! Conversation persistence.
//!
//! One pretty-printed JSON file per conversation, named after its id, under
//! the conversations directory. Writes go through a temp file and a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{ChatMessage, Role};

const TITLE_MAX_CHARS: usize = 50;
const UNTITLED: &str = "Untitled Conversation";

/// A persisted chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub model: String,
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
    /// Files whose text was injected into the system prompt.
    #[serde(default)]
    pub attached_resources: Vec<PathBuf>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// [`Conversation`] without its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id: String,
    pub title: String,
    pub model: String,
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub message_count: usize,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub attached_resources: Vec<PathBuf>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConversationMetadata {
    /// Case-insensitive substring match on title, model or any tag.
    /// `query` must already be lowercase.
    fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(query)
            || self.model.to_lowercase().contains(query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(query))
    }
}

impl Conversation {
    /// A fresh conversation with a new id and a title taken from `messages`.
    pub fn new(
        model: impl Into<String>,
        profile_name: impl Into<String>,
        messages: Vec<ChatMessage>,
        attached_resources: Vec<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        let mut conversation = Self {
            id: new_conversation_id(),
            title: derive_title(&messages),
            model: model.into(),
            profile_name: profile_name.into(),
            created_at: now,
            last_modified: now,
            messages,
            message_count: 0,
            prompt_tokens: 0,
            total_tokens: 0,
            attached_resources,
            tags: Vec::new(),
        };
        conversation.refresh_aggregates();
        conversation
    }

    /// Recompute the message count and token sums from `messages`.
    pub fn refresh_aggregates(&mut self) {
        self.message_count = self.messages.len();
        self.prompt_tokens = self.messages.iter().map(|m| u64::from(m.prompt_tokens)).sum();
        self.total_tokens = self.messages.iter().map(|m| u64::from(m.total_tokens)).sum();
    }

    pub fn metadata(&self) -> ConversationMetadata {
        ConversationMetadata {
            id: self.id.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            profile_name: self.profile_name.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            message_count: self.message_count,
            prompt_tokens: self.prompt_tokens,
            total_tokens: self.total_tokens,
            attached_resources: self.attached_resources.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// `conv_<unix nanos>`, strictly increasing within the process.
pub fn new_conversation_id() -> String {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n as u64)
        .unwrap_or_default();

    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return format!("conv_{}", next),
            Err(current) => last = current,
        }
    }
}

/// First user message with newlines flattened, cut to 50 chars plus `...`.
pub fn derive_title(messages: &[ChatMessage]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return UNTITLED.to_string();
    };

    let flat = first.content.replace('\n', " ");
    if flat.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = flat.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str("...");
        title
    } else {
        flat
    }
}

/// File-backed conversation store.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Persist `conversation`, refreshing its aggregates and `last_modified`.
    pub fn save(&self, conversation: &mut Conversation) -> Result<(), StoreError> {
        let path = self.path_for(&conversation.id)?;

        conversation.refresh_aggregates();
        conversation.last_modified = Utc::now();

        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(conversation)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &path)?;

        info!(
            id = %conversation.id,
            messages = conversation.message_count,
            "Saved conversation"
        );
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Conversation, StoreError> {
        let path = self.path_for(id)?;
        let content = fs::read_to_string(&path).map_err(|e| not_found_or(e, id))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        fs::remove_file(&path).map_err(|e| not_found_or(e, id))?;
        info!(id, "Deleted conversation");
        Ok(())
    }

    /// Metadata of every readable conversation, most recently modified first.
    pub fn list(&self) -> Result<Vec<ConversationMetadata>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut conversations = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|content| Ok(serde_json::from_str::<ConversationMetadata>(&content)?));
            match parsed {
                Ok(meta) => conversations.push(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable conversation"),
            }
        }

        conversations.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        debug!(count = conversations.len(), "Listed conversations");
        Ok(conversations)
    }

    /// [`list`](Self::list) filtered by title, model or tag. An empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Result<Vec<ConversationMetadata>, StoreError> {
        let query = query.trim().to_lowercase();
        let all = self.list()?;
        if query.is_empty() {
            return Ok(all);
        }
        Ok(all.into_iter().filter(|meta| meta.matches(&query)).collect())
    }
}

fn not_found_or(err: io::Error, id: &str) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatReply;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample(first: &str) -> Conversation {
        let reply = ChatReply {
            content: "Sure.".to_string(),
            prompt_tokens: 12,
            total_tokens: 20,
        };
        Conversation::new(
            "llama3.2:3b",
            "General Assistant",
            vec![
                ChatMessage::user(first),
                ChatMessage::assistant(reply, Duration::from_millis(800)),
            ],
            vec![PathBuf::from("/tmp/notes.md")],
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_conversation_id();
        let b = new_conversation_id();
        assert!(a.starts_with("conv_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title(&[]), "Untitled Conversation");
        assert_eq!(derive_title(&[ChatMessage::user("line one\nline two")]), "line one line two");

        let long = "x".repeat(60);
        let title = derive_title(&[ChatMessage::user(long)]);
        assert_eq!(title, format!("{}...", "x".repeat(50)));

        let exactly = "y".repeat(50);
        assert_eq!(derive_title(&[ChatMessage::user(exactly.clone())]), exactly);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("conversations"));

        let mut conv = sample("How do lifetimes work?");
        conv.tags = vec!["rust".to_string()];
        store.save(&mut conv).unwrap();

        assert_eq!(conv.message_count, 2);
        assert_eq!(conv.prompt_tokens, 12);
        assert_eq!(conv.total_tokens, 20);

        let loaded = store.load(&conv.id).unwrap();
        assert_eq!(loaded.messages, conv.messages);
        assert_eq!(loaded.tags, conv.tags);

        let mut again = loaded.clone();
        store.save(&mut again).unwrap();
        let reloaded = store.load(&conv.id).unwrap();
        assert_eq!(reloaded.messages, conv.messages);
        assert_eq!(reloaded.tags, conv.tags);
        assert!(reloaded.last_modified >= loaded.last_modified);
    }

    #[test]
    fn test_save_recomputes_aggregates() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());

        let mut conv = sample("hi");
        conv.messages.pop();
        conv.message_count = 99;
        store.save(&mut conv).unwrap();

        let loaded = store.load(&conv.id).unwrap();
        assert_eq!(loaded.message_count, 1);
        assert_eq!(loaded.total_tokens, 0);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());
        assert!(matches!(store.load("conv_1"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("conv_1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());
        assert!(matches!(store.load("../etc/passwd"), Err(StoreError::InvalidId(_))));
        assert!(matches!(store.load(""), Err(StoreError::InvalidId(_))));
    }

    #[test]
    fn test_load_corrupt_is_parse_error() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());
        fs::write(dir.path().join("conv_1.json"), "{not json").unwrap();
        assert!(matches!(store.load("conv_1"), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_and_skips_corrupt() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());

        let mut older = sample("first");
        store.save(&mut older).unwrap();
        let mut newer = sample("second");
        store.save(&mut newer).unwrap();

        fs::write(dir.path().join("broken.json"), "[1, 2").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[test]
    fn test_list_skips_unreadable_entries() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());

        let mut kept = sample("kept");
        store.save(&mut kept).unwrap();
        fs::create_dir(dir.path().join("conv_dir.json")).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
    }

    #[test]
    fn test_search() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());

        let mut rust = sample("Borrow checker questions");
        rust.tags = vec!["Rust".to_string()];
        store.save(&mut rust).unwrap();

        let mut poem = sample("Write a haiku");
        poem.model = "mistral:7b".to_string();
        store.save(&mut poem).unwrap();

        let by_title = store.search("BORROW").unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, rust.id);

        let by_model = store.search("mistral").unwrap();
        assert_eq!(by_model.len(), 1);
        assert_eq!(by_model[0].id, poem.id);

        let by_tag = store.search("rust").unwrap();
        assert_eq!(by_tag.len(), 1);

        let mut all: Vec<_> = store.search("").unwrap().into_iter().map(|m| m.id).collect();
        let mut listed: Vec<_> = store.list().unwrap().into_iter().map(|m| m.id).collect();
        all.sort();
        listed.sort();
        assert_eq!(all, listed);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path());
        let mut conv = sample("bye");
        store.save(&mut conv).unwrap();

        store.delete(&conv.id).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
