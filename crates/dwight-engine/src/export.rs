//! Conversation export to Markdown, JSON and plain text.
//!
//! Rendering only; writing the result somewhere is up to the caller.

use std::fmt::{self, Write};
use std::str::FromStr;

use chrono::Local;

use crate::error::{StoreError, ValidationError};
use crate::store::{Conversation, ConversationMetadata, ConversationStore};
use crate::types::{ChatMessage, Role};

const FILE_TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(ValidationError::UnknownExportFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Assistant turns with a recorded duration get a timing annotation.
fn timing(message: &ChatMessage) -> Option<(f64, u32)> {
    if message.role == Role::Assistant && !message.duration.is_zero() {
        Some((message.duration.as_secs_f64(), message.total_tokens))
    } else {
        None
    }
}

pub fn render_markdown(conversation: &Conversation) -> String {
    let created = conversation.created_at.with_timezone(&Local);

    let mut md = String::new();
    let _ = write!(md, "# {}\n\n", conversation.title);
    let _ = write!(
        md,
        "**Model:** {} ({})  \n",
        conversation.model, conversation.profile_name
    );
    let _ = write!(md, "**Created:** {}  \n", created.format("%B %-d, %Y %-I:%M %p"));
    let _ = write!(md, "**Messages:** {}  \n", conversation.message_count);
    let _ = write!(md, "**Tokens:** {}  \n\n", conversation.total_tokens);

    if !conversation.attached_resources.is_empty() {
        md.push_str("**Attached Resources:**\n");
        for resource in &conversation.attached_resources {
            let _ = writeln!(md, "- {}", resource.display());
        }
        md.push('\n');
    }

    md.push_str("---\n\n");

    for message in &conversation.messages {
        match message.role {
            Role::User => md.push_str("## 👤 User\n\n"),
            _ => md.push_str("## 🤖 Assistant\n\n"),
        }
        if let Some((secs, tokens)) = timing(message) {
            let _ = write!(md, "*Response time: {:.1}s | Tokens: {}*\n\n", secs, tokens);
        }
        md.push_str(&message.content);
        md.push_str("\n\n---\n\n");
    }

    md
}

pub fn render_json(conversation: &Conversation) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(conversation)?)
}

pub fn render_text(conversation: &Conversation) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", conversation.title);
    let _ = writeln!(text, "Model: {}", conversation.model);
    text.push_str(&"=".repeat(50));
    text.push_str("\n\n");

    for message in &conversation.messages {
        match message.role {
            Role::User => text.push_str("USER:\n"),
            _ => {
                text.push_str("ASSISTANT:\n");
                if let Some((secs, tokens)) = timing(message) {
                    let _ = writeln!(text, "({:.1}s, {} tokens)", secs, tokens);
                }
            }
        }
        text.push_str(&message.content);
        text.push_str("\n\n");
        text.push_str(&"-".repeat(30));
        text.push_str("\n\n");
    }

    text
}

/// `<safe title>_<created %Y%m%d_%H%M%S>.<ext>`
pub fn export_file_name(meta: &ConversationMetadata, format: ExportFormat) -> String {
    let safe_title: String = meta
        .title
        .replace('/', "-")
        .replace(' ', "_")
        .chars()
        .take(FILE_TITLE_MAX_CHARS)
        .collect();

    format!(
        "{}_{}.{}",
        safe_title,
        meta.created_at.with_timezone(&Local).format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

impl ConversationStore {
    pub fn export_markdown(&self, id: &str) -> Result<String, StoreError> {
        Ok(render_markdown(&self.load(id)?))
    }

    pub fn export_json(&self, id: &str) -> Result<String, StoreError> {
        render_json(&self.load(id)?)
    }

    pub fn export_plain_text(&self, id: &str) -> Result<String, StoreError> {
        Ok(render_text(&self.load(id)?))
    }

    pub fn export(&self, id: &str, format: ExportFormat) -> Result<String, StoreError> {
        match format {
            ExportFormat::Markdown => self.export_markdown(id),
            ExportFormat::Json => self.export_json(id),
            ExportFormat::Text => self.export_plain_text(id),
        }
    }
}
