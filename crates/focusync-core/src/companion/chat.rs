//! Reply generation for a companion, with canned fallbacks.

use super::history::{HistoryLimits, bounded_history};
use super::personas::persona;
use autoagents_llm::LLMProvider;
use autoagents_llm::chat::{ChatMessage as LlmMessage, ChatRole, MessageType};
use focusync_protocol::{ChatMessage, Companion, Speaker};
use log::{debug, warn};
use rand::seq::IndexedRandom;
use std::sync::Arc;

/// Markers providers use when a request or reply was blocked by moderation.
const MODERATION_MARKERS: &[&str] = &["moderation", "content_filter", "content policy", "flagged"];

/// Why a canned line was used instead of a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No provider is configured.
    Unavailable,
    /// The provider call failed.
    Provider(String),
    /// The provider refused on moderation grounds.
    Moderated,
    /// The provider answered with no text.
    Empty,
}

/// Text to show for the companion's turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionReply {
    pub companion: Companion,
    pub text: String,
    pub fallback: Option<FallbackReason>,
}

impl CompanionReply {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Canned line from the companion's persona.
    pub fn fallback(companion: Companion, reason: FallbackReason) -> Self {
        let lines = persona(companion).fallback_lines;
        let text = lines
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(persona(companion).greeting);
        Self {
            companion,
            text: text.to_string(),
            fallback: Some(reason),
        }
    }
}

/// Stateless chat client; history comes from the chat store.
#[derive(Clone)]
pub struct CompanionChat {
    llm: Arc<dyn LLMProvider>,
    limits: HistoryLimits,
}

impl CompanionChat {
    pub fn new(llm: Arc<dyn LLMProvider>, limits: HistoryLimits) -> Self {
        Self { llm, limits }
    }

    pub fn limits(&self) -> &HistoryLimits {
        &self.limits
    }

    /// Messages sent to the model: persona prompt, bounded history, then input.
    pub fn build_messages(
        &self,
        companion: Companion,
        history: &[ChatMessage],
        input: &str,
    ) -> Vec<LlmMessage> {
        let window = bounded_history(history, &self.limits);
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(LlmMessage {
            role: ChatRole::System,
            message_type: MessageType::Text,
            content: persona(companion).system_prompt.to_string(),
        });
        for message in window {
            let role = match message.speaker {
                Speaker::User => ChatRole::User,
                Speaker::Companion => ChatRole::Assistant,
            };
            messages.push(LlmMessage {
                role,
                message_type: MessageType::Text,
                content: message.content,
            });
        }
        messages.push(LlmMessage {
            role: ChatRole::User,
            message_type: MessageType::Text,
            content: input.to_string(),
        });
        messages
    }

    /// Ask the model for the companion's reply. Never fails: errors, moderation
    /// and empty answers all yield a canned line.
    pub async fn reply(
        &self,
        companion: Companion,
        history: &[ChatMessage],
        input: &str,
    ) -> CompanionReply {
        let messages = self.build_messages(companion, history, input);
        debug!(
            "requesting companion reply (companion={}, messages={})",
            companion,
            messages.len()
        );
        let response = match self.llm.chat_with_tools(&messages, None, None).await {
            Ok(response) => response,
            Err(err) => {
                let message = err.to_string();
                let reason = if is_moderation(&message) {
                    FallbackReason::Moderated
                } else {
                    FallbackReason::Provider(message.clone())
                };
                warn!("companion reply failed (companion={companion}): {message}");
                return CompanionReply::fallback(companion, reason);
            }
        };
        let text = response.text().unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            warn!("companion reply was empty (companion={companion})");
            return CompanionReply::fallback(companion, FallbackReason::Empty);
        }
        CompanionReply {
            companion,
            text: text.to_string(),
            fallback: None,
        }
    }
}

fn is_moderation(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    MODERATION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_persona_lines() {
        let reply = CompanionReply::fallback(Companion::Ember, FallbackReason::Empty);
        assert!(persona(Companion::Ember).fallback_lines.contains(&reply.text.as_str()));
        assert!(reply.is_fallback());
    }

    #[test]
    fn detects_moderation_errors() {
        assert!(is_moderation("Provider error: content_filter triggered"));
        assert!(!is_moderation("connection reset"));
    }
}
