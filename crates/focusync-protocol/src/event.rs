//! Domain events published by sync engines and consumed by other stores.

use crate::{AchievementCategory, Companion, OwnerId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wrapper for events emitted on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique id for the event.
    pub id: Uuid,
    /// Owner whose data produced the event.
    pub owner: OwnerId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: DomainEvent,
}

impl EventEnvelope {
    pub fn new(owner: OwnerId, payload: DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// Cross-domain facts. Stores react to these instead of calling each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum DomainEvent {
    /// A goal reached its target.
    GoalCompleted {
        goal_id: RecordId,
        companion: Companion,
        minutes: u32,
    },
    /// A goal passed its deadline while active.
    GoalExpired {
        goal_id: RecordId,
        companion: Companion,
    },
    /// A focus interval ran to completion.
    FocusSessionCompleted {
        companion: Companion,
        minutes: u32,
        completed_at: DateTime<Utc>,
    },
    /// The user sent a chat message.
    MessageSent {
        companion: Companion,
        message_id: RecordId,
    },
    /// A companion's daily focus streak grew.
    StreakExtended { companion: Companion, days: u32 },
    /// An achievement crossed its target.
    AchievementUnlocked {
        achievement_id: RecordId,
        category: AchievementCategory,
    },
}

impl DomainEvent {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::GoalCompleted { .. } => "goal_completed",
            DomainEvent::GoalExpired { .. } => "goal_expired",
            DomainEvent::FocusSessionCompleted { .. } => "focus_session_completed",
            DomainEvent::MessageSent { .. } => "message_sent",
            DomainEvent::StreakExtended { .. } => "streak_extended",
            DomainEvent::AchievementUnlocked { .. } => "achievement_unlocked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::GoalCompleted {
            goal_id: "g1".to_string(),
            companion: Companion::Sage,
            minutes: 23,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "goal_completed",
                "payload": { "goal_id": "g1", "companion": "sage", "minutes": 23 }
            })
        );
        assert_eq!(event.kind(), "goal_completed");
    }
}
