//! Achievement progress driven by events from the other domains.

use super::{applied_mark, decode_all, fetch, merge_by_identity, timestamp_value};
use crate::cache::{Entity, LocalCache};
use crate::engine::DomainAdapter;
use crate::queue::PendingMutation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focusync_protocol::{AchievementCategory, AchievementProgress, DomainEvent, OwnerId, RecordId};
use focusync_remote::{FieldUpdate, Query, RemoteError, RemoteStore, paths};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Names the mutation whose write unlocked an achievement.
const UNLOCKED_BY: &str = "unlocked_by";

/// Static description of one achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: AchievementCategory,
    pub target: u32,
}

impl AchievementDef {
    fn fresh(&self, now: DateTime<Utc>) -> AchievementProgress {
        AchievementProgress {
            id: self.id.to_string(),
            category: self.category,
            progress: 0,
            target: self.target,
            unlocked_at: None,
            updated_at: now,
        }
    }
}

const CATALOG: &[AchievementDef] = &[
    AchievementDef {
        id: "first_focus",
        title: "First Focus",
        description: "Finish a focus session.",
        category: AchievementCategory::Focus,
        target: 1,
    },
    AchievementDef {
        id: "deep_diver",
        title: "Deep Diver",
        description: "Finish 25 focus sessions.",
        category: AchievementCategory::Focus,
        target: 25,
    },
    AchievementDef {
        id: "focus_marathon",
        title: "Focus Marathon",
        description: "Accumulate 600 focus minutes.",
        category: AchievementCategory::Focus,
        target: 600,
    },
    AchievementDef {
        id: "goal_getter",
        title: "Goal Getter",
        description: "Complete a goal.",
        category: AchievementCategory::Goals,
        target: 1,
    },
    AchievementDef {
        id: "goal_crusher",
        title: "Goal Crusher",
        description: "Complete 10 goals.",
        category: AchievementCategory::Goals,
        target: 10,
    },
    AchievementDef {
        id: "first_hello",
        title: "First Hello",
        description: "Send a message to a companion.",
        category: AchievementCategory::Social,
        target: 1,
    },
    AchievementDef {
        id: "chatterbox",
        title: "Chatterbox",
        description: "Send 50 messages.",
        category: AchievementCategory::Social,
        target: 50,
    },
    AchievementDef {
        id: "streak_3",
        title: "Warming Up",
        description: "Focus three days in a row.",
        category: AchievementCategory::Streak,
        target: 3,
    },
    AchievementDef {
        id: "streak_7",
        title: "Unbroken Week",
        description: "Focus seven days in a row.",
        category: AchievementCategory::Streak,
        target: 7,
    },
];

/// Every achievement a user can earn.
pub fn catalog() -> &'static [AchievementDef] {
    CATALOG
}

pub fn definition(id: &str) -> Option<&'static AchievementDef> {
    CATALOG.iter().find(|def| def.id == id)
}

impl Entity for AchievementProgress {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection(&self) -> String {
        self.category.as_str().to_string()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AchievementMutation {
    /// Add to a counter-style achievement.
    AddProgress {
        id: RecordId,
        amount: u32,
        at: DateTime<Utc>,
    },
    /// Raise a high-water achievement (such as streak length) to `value`.
    RaiseTo {
        id: RecordId,
        value: u32,
        at: DateTime<Utc>,
    },
}

impl AchievementMutation {
    pub fn id(&self) -> &str {
        match self {
            AchievementMutation::AddProgress { id, .. } | AchievementMutation::RaiseTo { id, .. } => {
                id
            }
        }
    }

    fn at(&self) -> DateTime<Utc> {
        match self {
            AchievementMutation::AddProgress { at, .. } | AchievementMutation::RaiseTo { at, .. } => {
                *at
            }
        }
    }

    /// Amount to add on top of `current` progress.
    fn delta(&self, current: u32) -> u32 {
        match self {
            AchievementMutation::AddProgress { amount, .. } => *amount,
            AchievementMutation::RaiseTo { value, .. } => value.saturating_sub(current),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementsAdapter;

impl AchievementsAdapter {
    pub fn new() -> Self {
        Self
    }

    fn add(
        cache: &LocalCache<AchievementProgress>,
        id: &str,
        amount: u32,
        at: DateTime<Utc>,
        out: &mut Vec<AchievementMutation>,
    ) {
        if amount == 0 || cache.find(id).is_some_and(AchievementProgress::is_unlocked) {
            return;
        }
        out.push(AchievementMutation::AddProgress {
            id: id.to_string(),
            amount,
            at,
        });
    }

    fn raise(
        cache: &LocalCache<AchievementProgress>,
        id: &str,
        value: u32,
        at: DateTime<Utc>,
        out: &mut Vec<AchievementMutation>,
    ) {
        let current = cache.find(id);
        if current.is_some_and(|record| record.is_unlocked() || record.progress >= value) {
            return;
        }
        out.push(AchievementMutation::RaiseTo {
            id: id.to_string(),
            value,
            at,
        });
    }
}

#[async_trait]
impl DomainAdapter for AchievementsAdapter {
    type Record = AchievementProgress;
    type Mutation = AchievementMutation;

    const NAMESPACE: &'static str = "achievements";

    fn apply_local(
        &self,
        cache: &mut LocalCache<AchievementProgress>,
        mutation: &AchievementMutation,
        _now: DateTime<Utc>,
    ) {
        let Some(def) = definition(mutation.id()) else {
            warn!("unknown achievement ignored (id={})", mutation.id());
            return;
        };
        let at = mutation.at();
        let mut record = cache
            .find(def.id)
            .cloned()
            .unwrap_or_else(|| def.fresh(at));
        let delta = mutation.delta(record.progress);
        if delta == 0 {
            return;
        }
        if record.advance(delta, at) {
            info!("achievement unlocked locally (id={})", def.id);
        }
        cache.upsert_one(record);
    }

    fn touched_identity(&self, mutation: &AchievementMutation) -> Option<RecordId> {
        Some(mutation.id().to_string())
    }

    async fn replay(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
        entry: &PendingMutation<AchievementMutation>,
    ) -> Result<Vec<DomainEvent>, RemoteError> {
        let mutation = &entry.mutation;
        let Some(def) = definition(mutation.id()) else {
            warn!("unknown achievement dropped (id={})", mutation.id());
            return Ok(Vec::new());
        };
        let unlocked_event = || DomainEvent::AchievementUnlocked {
            achievement_id: def.id.to_string(),
            category: def.category,
        };
        let path = paths::achievements(owner).doc(def.id);
        let fetched = fetch::<AchievementProgress>(remote, &path).await?;
        if fetched.applied(&entry.id) {
            debug!(
                "achievement mutation already applied; confirming (path={path}, mutation={})",
                entry.id
            );
            if fetched.caused_by(UNLOCKED_BY, &entry.id) {
                return Ok(vec![unlocked_event()]);
            }
            return Ok(Vec::new());
        }

        let at = mutation.at();
        let mut record = fetched.record.unwrap_or_else(|| def.fresh(at));
        let delta = mutation.delta(record.progress);
        if delta == 0 {
            return Ok(Vec::new());
        }
        let unlocked = record.advance(delta, at);

        let mut updates = vec![
            applied_mark(&entry.id),
            FieldUpdate::set("id", def.id),
            FieldUpdate::set(
                "category",
                serde_json::to_value(def.category).unwrap_or_default(),
            ),
            FieldUpdate::set("target", def.target),
            FieldUpdate::set("updated_at", timestamp_value(at)),
        ];
        match mutation {
            AchievementMutation::AddProgress { amount, .. } => {
                updates.push(FieldUpdate::increment("progress", i64::from(*amount)));
            }
            AchievementMutation::RaiseTo { value, .. } => {
                updates.push(FieldUpdate::set("progress", *value));
            }
        }
        let mut events = Vec::new();
        if unlocked {
            updates.push(FieldUpdate::set("unlocked_at", timestamp_value(at)));
            updates.push(FieldUpdate::set(UNLOCKED_BY, entry.id.as_str()));
            events.push(unlocked_event());
        }
        remote.update(&path, &updates).await?;
        Ok(events)
    }

    async fn pull(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
    ) -> Result<Option<Vec<AchievementProgress>>, RemoteError> {
        let documents = remote
            .query(&paths::achievements(owner), &Query::new())
            .await?;
        Ok(Some(decode_all(&documents)))
    }

    fn merge(
        &self,
        local: Vec<AchievementProgress>,
        remote: Vec<AchievementProgress>,
        unconfirmed: &HashSet<RecordId>,
    ) -> Vec<AchievementProgress> {
        merge_by_identity(local, remote, unconfirmed, true, |local, mut remote| {
            remote.progress = remote.progress.max(local.progress);
            remote.unlocked_at = match (local.unlocked_at, remote.unlocked_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            remote
        })
    }

    fn on_event(
        &self,
        event: &DomainEvent,
        cache: &LocalCache<AchievementProgress>,
        now: DateTime<Utc>,
    ) -> Vec<AchievementMutation> {
        let mut out = Vec::new();
        match event {
            DomainEvent::FocusSessionCompleted { minutes, .. } => {
                Self::add(cache, "first_focus", 1, now, &mut out);
                Self::add(cache, "deep_diver", 1, now, &mut out);
                Self::add(cache, "focus_marathon", *minutes, now, &mut out);
            }
            DomainEvent::GoalCompleted { .. } => {
                Self::add(cache, "goal_getter", 1, now, &mut out);
                Self::add(cache, "goal_crusher", 1, now, &mut out);
            }
            DomainEvent::MessageSent { .. } => {
                Self::add(cache, "first_hello", 1, now, &mut out);
                Self::add(cache, "chatterbox", 1, now, &mut out);
            }
            DomainEvent::StreakExtended { days, .. } => {
                Self::raise(cache, "streak_3", *days, now, &mut out);
                Self::raise(cache, "streak_7", *days, now, &mut out);
            }
            DomainEvent::GoalExpired { .. } | DomainEvent::AchievementUnlocked { .. } => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use focusync_protocol::Companion;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("time")
    }

    #[test]
    fn catalog_ids_are_unique() {
        let ids: HashSet<_> = catalog().iter().map(|def| def.id).collect();
        assert_eq!(ids.len(), catalog().len());
    }

    #[test]
    fn unlocked_achievements_stop_collecting_progress() {
        let adapter = AchievementsAdapter::new();
        let mut cache = LocalCache::new();
        let event = DomainEvent::GoalCompleted {
            goal_id: "g1".to_string(),
            companion: Companion::Sage,
            minutes: 20,
        };
        for mutation in adapter.on_event(&event, &cache, now()) {
            adapter.apply_local(&mut cache, &mutation, now());
        }
        let getter = cache.find("goal_getter").expect("goal getter");
        assert!(getter.is_unlocked());
        assert_eq!(cache.find("goal_crusher").map(|a| a.progress), Some(1));

        let next = adapter.on_event(&event, &cache, now());
        let ids: Vec<_> = next.iter().map(AchievementMutation::id).collect();
        assert_eq!(ids, vec!["goal_crusher"]);
    }

    #[test]
    fn raise_to_is_a_high_water_mark() {
        let adapter = AchievementsAdapter::new();
        let mut cache = LocalCache::new();
        for value in [2, 1] {
            adapter.apply_local(
                &mut cache,
                &AchievementMutation::RaiseTo {
                    id: "streak_7".to_string(),
                    value,
                    at: now(),
                },
                now(),
            );
        }
        assert_eq!(cache.find("streak_7").map(|a| a.progress), Some(2));
    }

    #[test]
    fn merge_keeps_highest_progress_and_earliest_unlock() {
        let adapter = AchievementsAdapter::new();
        let def = definition("chatterbox").expect("def");
        let mut local = def.fresh(now());
        local.progress = 12;
        let mut remote = def.fresh(now());
        remote.progress = 9;
        let merged = adapter.merge(vec![local], vec![remote], &HashSet::new());
        assert_eq!(merged[0].progress, 12);
        assert_eq!(merged[0].unlocked_at, None);
    }
}
