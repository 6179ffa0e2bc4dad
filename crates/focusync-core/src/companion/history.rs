//! Token-bounded conversation window sent to the model.

use focusync_config::ChatConfig;
use focusync_protocol::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_messages: usize,
    pub max_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_messages: 20,
            max_tokens: 2000,
            chars_per_token: 4,
        }
    }
}

impl From<&ChatConfig> for HistoryLimits {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_messages: config.max_history_messages,
            max_tokens: config.max_history_tokens,
            chars_per_token: config.chars_per_token,
        }
    }
}

/// Rough token count: one token per `chars_per_token` characters, rounded up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Newest messages that fit both limits, returned oldest first.
///
/// Stops at the first message that would exceed the token budget, so the
/// window is always a contiguous suffix of the conversation.
pub fn bounded_history(messages: &[ChatMessage], limits: &HistoryLimits) -> Vec<ChatMessage> {
    let mut used = 0usize;
    let mut window: Vec<ChatMessage> = Vec::new();
    for message in messages.iter().rev() {
        if window.len() >= limits.max_messages {
            break;
        }
        let tokens = estimate_tokens(&message.content, limits.chars_per_token);
        if used + tokens > limits.max_tokens {
            break;
        }
        used += tokens;
        window.push(message.clone());
    }
    window.reverse();
    window
}
