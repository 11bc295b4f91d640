//! Token estimation and context-window budgeting.
//!
//! History is trimmed from the oldest end so that the request plus the
//! reply fit the model's window. The last [`MIN_KEPT_MESSAGES`] messages
//! always survive, even when they alone exceed the budget.

use tracing::debug;

use crate::types::ChatMessage;

/// Window assumed for models missing from [`CONTEXT_WINDOWS`].
pub const DEFAULT_CONTEXT_WINDOW: u32 = 8192;

/// Messages always kept by [`trim_to_context`].
pub const MIN_KEPT_MESSAGES: usize = 4;

/// Known windows by model-name substring. First match wins.
const CONTEXT_WINDOWS: &[(&str, u32)] = &[
    ("llama3.2", 128_000),
    ("qwen2.5", 32_768),
    ("llama3.1", 128_000),
    ("mistral", 32_768),
];

/// Rough token count: four bytes per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Context window size for a backend model identifier.
pub fn context_window(model: &str) -> u32 {
    CONTEXT_WINDOWS
        .iter()
        .find(|(pattern, _)| model.contains(pattern))
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Tokens available for history: 80% of the window, the rest is left for the reply.
pub fn token_budget(model: &str) -> u64 {
    u64::from(context_window(model)) * 4 / 5
}

/// Recorded total if the backend reported one, otherwise an estimate.
pub fn message_cost(message: &ChatMessage) -> u64 {
    if message.total_tokens > 0 {
        u64::from(message.total_tokens)
    } else {
        u64::from(estimate_tokens(&message.content))
    }
}

pub fn history_cost(history: &[ChatMessage]) -> u64 {
    history.iter().map(message_cost).sum()
}

/// Drop the oldest messages until the history fits the model's budget.
///
/// Walks back from the newest message, keeping each one while the running
/// cost stays within budget; the first one that would overflow ends the
/// walk. The newest [`MIN_KEPT_MESSAGES`] are kept regardless.
pub fn trim_to_context(history: &[ChatMessage], model: &str) -> Vec<ChatMessage> {
    let budget = token_budget(model);

    if history_cost(history) <= budget || history.len() <= MIN_KEPT_MESSAGES {
        return history.to_vec();
    }

    let mut used = 0;
    let mut kept = 0;
    for message in history.iter().rev() {
        let cost = message_cost(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept += 1;
    }

    let kept = kept.max(MIN_KEPT_MESSAGES);
    debug!(
        model,
        budget,
        kept,
        dropped = history.len() - kept,
        "Trimmed history to context budget"
    );

    history[history.len() - kept..].to_vec()
}

/// How much of the model's window the history occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub used: u64,
    pub window: u32,
    pub percent: u64,
}

impl ContextUsage {
    pub fn of(history: &[ChatMessage], model: &str) -> Self {
        let used = history_cost(history);
        let window = context_window(model);
        Self {
            used,
            window,
            percent: used * 100 / u64::from(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn estimated(chars: usize) -> ChatMessage {
        ChatMessage::user("x".repeat(chars))
    }

    fn recorded(tokens: u32) -> ChatMessage {
        let mut msg = ChatMessage::user("short");
        msg.role = Role::Assistant;
        msg.total_tokens = tokens;
        msg
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window("llama3.2:3b"), 128_000);
        assert_eq!(context_window("qwen2.5-coder:7b"), 32_768);
        assert_eq!(context_window("mistral:7b"), 32_768);
        assert_eq!(context_window("phi3:3.8b"), 8192);
        assert_eq!(token_budget("phi3:3.8b"), 6553);
    }

    #[test]
    fn test_recorded_tokens_take_precedence() {
        assert_eq!(message_cost(&recorded(900)), 900);
        assert_eq!(message_cost(&estimated(400)), 100);
    }

    #[test]
    fn test_under_budget_unchanged() {
        let history: Vec<_> = (0..10).map(|_| estimated(400)).collect();
        assert_eq!(trim_to_context(&history, "phi3"), history);
    }

    #[test]
    fn test_floor_overrides_budget() {
        // Ten messages of ~2000 tokens against a 6553-token budget: the walk
        // keeps three, the floor forces a fourth.
        let history: Vec<_> = (0..10)
            .map(|i| {
                let mut msg = estimated(8000);
                msg.content.push_str(&i.to_string());
                msg
            })
            .collect();

        let trimmed = trim_to_context(&history, "unknown-model");
        assert_eq!(trimmed.len(), 4);
        assert_eq!(trimmed, history[6..].to_vec());
    }

    #[test]
    fn test_short_history_never_trimmed() {
        let history: Vec<_> = (0..4).map(|_| recorded(5000)).collect();
        assert_eq!(trim_to_context(&history, "phi3").len(), 4);
    }

    #[test]
    fn test_walk_stops_at_first_overflow() {
        // Oldest message is tiny but sits behind one that overflows.
        let history = vec![
            recorded(10),
            recorded(5000),
            recorded(500),
            recorded(500),
            recorded(500),
            recorded(500),
            recorded(500),
        ];

        let trimmed = trim_to_context(&history, "phi3");
        assert_eq!(trimmed.len(), 5);
        assert_eq!(history_cost(&trimmed), 2500);
    }

    #[test]
    fn test_trim_is_idempotent() {
        let history: Vec<_> = (0..12).map(|i| recorded(700 + i * 10)).collect();
        let once = trim_to_context(&history, "phi3");
        let twice = trim_to_context(&once, "phi3");
        assert_eq!(once, twice);
        assert!(history_cost(&once) <= token_budget("phi3"));
    }

    #[test]
    fn test_context_usage() {
        let history = vec![recorded(4096)];
        let usage = ContextUsage::of(&history, "phi3");
        assert_eq!(usage.window, 8192);
        assert_eq!(usage.percent, 50);
    }
}
