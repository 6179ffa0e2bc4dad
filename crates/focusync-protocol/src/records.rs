//! Entity records kept in local caches and mirrored to the remote store.

use crate::{Companion, RecordId, new_record_id};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Companion,
}

/// One line of a companion conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: RecordId,
    pub companion: Companion,
    pub speaker: Speaker,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a new message with a fresh identifier.
    pub fn new(
        companion: Companion,
        speaker: Speaker,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            companion,
            speaker,
            content: content.into(),
            created_at,
        }
    }
}

/// Lifecycle of a goal. `Completed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Expired,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Active)
    }
}

/// Focus-minutes goal set together with a companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: RecordId,
    pub companion: Companion,
    pub title: String,
    pub target_minutes: u32,
    #[serde(default)]
    pub current_minutes: u32,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(
        companion: Companion,
        title: impl Into<String>,
        target_minutes: u32,
        deadline: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            companion,
            title: title.into(),
            target_minutes,
            current_minutes: 0,
            status: GoalStatus::Active,
            deadline,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    /// Add focus minutes; returns true when this call completed the goal.
    ///
    /// Terminal goals are left untouched.
    pub fn apply_progress(&mut self, minutes: u32, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.current_minutes = self.current_minutes.saturating_add(minutes);
        if self.current_minutes >= self.target_minutes {
            self.status = GoalStatus::Completed;
            self.completed_at = Some(now);
            return true;
        }
        false
    }

    /// Mark the goal completed; no-op for terminal goals.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GoalStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    /// Mark the goal expired; no-op for terminal goals.
    pub fn expire(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GoalStatus::Expired;
        true
    }

    /// Whether the deadline has passed while the goal is still active.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.deadline.is_some_and(|deadline| deadline < now)
    }
}

/// Grouping used for the achievement catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Focus,
    Goals,
    Social,
    Streak,
}

impl AchievementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementCategory::Focus => "focus",
            AchievementCategory::Goals => "goals",
            AchievementCategory::Social => "social",
            AchievementCategory::Streak => "streak",
        }
    }
}

/// Progress toward one catalog achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub id: RecordId,
    pub category: AchievementCategory,
    #[serde(default)]
    pub progress: u32,
    pub target: u32,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementProgress {
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    /// Add progress; returns true when this call unlocked the achievement.
    pub fn advance(&mut self, amount: u32, now: DateTime<Utc>) -> bool {
        self.progress = self.progress.saturating_add(amount);
        self.updated_at = now;
        if self.unlocked_at.is_none() && self.progress >= self.target {
            self.unlocked_at = Some(now);
            return true;
        }
        false
    }
}

/// Per-companion relationship and focus statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionProfile {
    pub companion: Companion,
    #[serde(default)]
    pub affinity: u32,
    #[serde(default)]
    pub messages_sent: u32,
    #[serde(default)]
    pub focus_minutes: u32,
    #[serde(default)]
    pub sessions_completed: u32,
    #[serde(default)]
    pub goals_completed: u32,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub last_session_on: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

/// Affinity points needed per relationship level.
const AFFINITY_PER_LEVEL: u32 = 100;

impl CompanionProfile {
    pub fn new(companion: Companion, now: DateTime<Utc>) -> Self {
        Self {
            companion,
            affinity: 0,
            messages_sent: 0,
            focus_minutes: 0,
            sessions_completed: 0,
            goals_completed: 0,
            streak_days: 0,
            last_session_on: None,
            updated_at: now,
        }
    }

    /// Relationship level, starting at 1.
    pub fn level(&self) -> u32 {
        self.affinity / AFFINITY_PER_LEVEL + 1
    }

    /// Streak length after a focus session on `day`.
    pub fn next_streak(&self, day: NaiveDate) -> u32 {
        match self.last_session_on {
            Some(last) if last == day => self.streak_days.max(1),
            Some(last) if last.succ_opt() == Some(day) => self.streak_days.saturating_add(1),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().expect("time")
    }

    #[test]
    fn goal_completes_once_target_is_reached() {
        let mut goal = Goal::new(Companion::Sage, "read", 20, None, at(8));
        goal.current_minutes = 8;

        assert_eq!(goal.apply_progress(5, at(9)), false);
        assert_eq!(goal.apply_progress(10, at(10)), true);
        assert_eq!(goal.current_minutes, 23);
        assert_eq!(goal.status, GoalStatus::Completed);
        assert_eq!(goal.completed_at, Some(at(10)));
    }

    #[test]
    fn terminal_goals_ignore_transitions() {
        let mut goal = Goal::new(Companion::Sage, "write", 10, None, at(8));
        assert!(goal.expire());
        assert_eq!(goal.apply_progress(30, at(9)), false);
        assert_eq!(goal.complete(at(9)), false);
        assert_eq!(goal.status, GoalStatus::Expired);
        assert_eq!(goal.current_minutes, 0);
    }

    #[test]
    fn overdue_requires_active_goal_past_deadline() {
        let mut goal = Goal::new(Companion::Tide, "plan", 10, Some(at(9)), at(8));
        assert!(!goal.is_overdue(at(8)));
        assert!(goal.is_overdue(at(10)));
        goal.complete(at(8));
        assert!(!goal.is_overdue(at(10)));
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let mut profile = CompanionProfile::new(Companion::Spark, at(8));
        let day = at(8).date_naive();
        assert_eq!(profile.next_streak(day), 1);

        profile.last_session_on = Some(day);
        profile.streak_days = 1;
        assert_eq!(profile.next_streak(day), 1);
        assert_eq!(profile.next_streak(day + Duration::days(1)), 2);
        assert_eq!(profile.next_streak(day + Duration::days(3)), 1);
    }

    #[test]
    fn achievement_unlocks_once() {
        let mut progress = AchievementProgress {
            id: "first_focus".to_string(),
            category: AchievementCategory::Focus,
            progress: 0,
            target: 2,
            unlocked_at: None,
            updated_at: at(8),
        };
        assert!(!progress.advance(1, at(9)));
        assert!(progress.advance(1, at(10)));
        assert!(!progress.advance(1, at(11)));
        assert_eq!(progress.unlocked_at, Some(at(10)));
        assert_eq!(progress.progress, 3);
    }
}
