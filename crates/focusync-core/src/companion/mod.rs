//! Companion chat: personas, bounded history and the LLM reply path.

mod chat;
mod history;
mod personas;
mod provider;

pub use chat::{CompanionChat, CompanionReply, FallbackReason};
pub use history::{HistoryLimits, bounded_history, estimate_tokens};
pub use personas::{Persona, persona};
pub use provider::build_openai_provider;
