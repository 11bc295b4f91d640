//! Request assembly: system prompt, attached resources and history.

use std::fmt::Write;

use crate::profiles::ModelProfile;
use crate::types::{ChatMessage, RequestMessage, Role};

const RESOURCES_HEADER: &str = "=== ATTACHED RESOURCES ===";
const RESOURCES_FOOTER: &str = "=== END RESOURCES ===";
const RESOURCES_INSTRUCTION: &str =
    "Use the attached resources above as context when answering.";

/// Text of a file injected into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Shown in the delimiter line, usually the file name.
    pub label: String,
    pub text: String,
}

impl Attachment {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Format attached resources as one delimited block.
pub fn resources_block(attachments: &[Attachment]) -> String {
    let mut block = String::new();
    block.push_str(RESOURCES_HEADER);
    block.push_str("\n\n");
    for attachment in attachments {
        let _ = writeln!(block, "--- File: {} ---", attachment.label);
        block.push_str(&attachment.text);
        block.push_str("\n\n");
    }
    block.push_str(RESOURCES_FOOTER);
    block.push_str("\n\n");
    block.push_str(RESOURCES_INSTRUCTION);
    block
}

/// Preamble, profile prompt and resources joined by blank lines.
/// `None` when all three are empty.
pub fn system_text(
    preamble: &str,
    profile: &ModelProfile,
    attachments: &[Attachment],
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if !preamble.trim().is_empty() {
        parts.push(preamble.trim().to_string());
    }
    if !profile.system_prompt.trim().is_empty() {
        parts.push(profile.system_prompt.trim().to_string());
    }
    if !attachments.is_empty() {
        parts.push(resources_block(attachments));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Build the `messages` array for `/api/chat`.
///
/// Order: optional system entry, the user/assistant history, then the new
/// user turn. History entries with any other role are dropped.
pub fn assemble_request(
    history: &[ChatMessage],
    new_user_text: &str,
    profile: &ModelProfile,
    preamble: &str,
    attachments: &[Attachment],
) -> Vec<RequestMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if let Some(system) = system_text(preamble, profile, attachments) {
        messages.push(RequestMessage::new(Role::System, system));
    }

    messages.extend(
        history
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| RequestMessage::new(m.role, m.content.clone())),
    );

    messages.push(RequestMessage::new(Role::User, new_user_text));
    messages
}
