//! Shared value types for focusync: owners, companions, synced records and
//! the domain events stores publish to each other.

mod clock;
mod event;
mod records;

pub use clock::{Clock, SystemClock};
pub use event::{DomainEvent, EventEnvelope};
pub use records::{
    AchievementCategory, AchievementProgress, ChatMessage, CompanionProfile, Goal, GoalStatus,
    Speaker,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a synced record within its collection.
pub type RecordId = String;

/// Generate a fresh record identifier.
pub fn new_record_id() -> RecordId {
    Uuid::new_v4().to_string()
}

/// Authenticated user identifier; partition key for all per-user collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Chat persona a user talks to while focusing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Companion {
    /// Calm mentor.
    Sage,
    /// Upbeat cheerleader.
    Spark,
    /// Blunt coach.
    Ember,
    /// Gentle listener.
    Tide,
}

impl Companion {
    /// Every companion, in display order.
    pub const ALL: [Companion; 4] = [
        Companion::Sage,
        Companion::Spark,
        Companion::Ember,
        Companion::Tide,
    ];

    /// Return the companion as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Companion::Sage => "sage",
            Companion::Spark => "spark",
            Companion::Ember => "ember",
            Companion::Tide => "tide",
        }
    }

    /// Parse a companion from its lowercase name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|companion| companion.as_str() == value)
    }
}

impl fmt::Display for Companion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the focus timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPhase {
    /// Work interval.
    Focus,
    /// Break between focus intervals.
    ShortBreak,
    /// Longer break after several focus intervals.
    LongBreak,
}

impl FocusPhase {
    pub fn is_break(&self) -> bool {
        !matches!(self, FocusPhase::Focus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn companion_parses_and_formats() {
        for companion in Companion::ALL {
            assert_eq!(Companion::parse(companion.as_str()), Some(companion));
        }
        assert_eq!(Companion::parse("nobody"), None);
        assert_eq!(
            serde_json::to_value(Companion::Ember).expect("serialize"),
            serde_json::json!("ember")
        );
    }

    #[test]
    fn owner_id_serializes_as_plain_string() {
        let owner = OwnerId::new("user-a");
        assert_eq!(
            serde_json::to_value(&owner).expect("serialize"),
            serde_json::json!("user-a")
        );
        assert_eq!(owner.to_string(), "user-a");
    }
}
