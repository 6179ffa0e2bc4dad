//! Per-companion relationship counters and focus streaks.

use super::{applied_mark, decode_all, fetch, merge_by_identity, timestamp_value};
use crate::cache::{Entity, LocalCache};
use crate::engine::DomainAdapter;
use crate::queue::PendingMutation;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use focusync_protocol::{Companion, CompanionProfile, DomainEvent, OwnerId, RecordId};
use focusync_remote::{FieldUpdate, Query, RemoteError, RemoteStore, paths};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Names the focus session whose write last grew the streak.
const STREAK_EXTENDED_BY: &str = "streak_extended_by";

/// Affinity earned per message sent.
const MESSAGE_AFFINITY: u32 = 1;
/// Affinity earned per completed goal.
const GOAL_AFFINITY: u32 = 10;
/// Focus minutes per affinity point.
const MINUTES_PER_AFFINITY: u32 = 5;

impl Entity for CompanionProfile {
    fn id(&self) -> &str {
        self.companion.as_str()
    }

    fn collection(&self) -> String {
        self.companion.as_str().to_string()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StatsMutation {
    RecordFocusSession {
        companion: Companion,
        minutes: u32,
        day: NaiveDate,
        at: DateTime<Utc>,
    },
    RecordMessage {
        companion: Companion,
        at: DateTime<Utc>,
    },
    RecordGoalCompleted {
        companion: Companion,
        at: DateTime<Utc>,
    },
    AddAffinity {
        companion: Companion,
        points: u32,
        at: DateTime<Utc>,
    },
}

impl StatsMutation {
    pub fn companion(&self) -> Companion {
        match self {
            StatsMutation::RecordFocusSession { companion, .. }
            | StatsMutation::RecordMessage { companion, .. }
            | StatsMutation::RecordGoalCompleted { companion, .. }
            | StatsMutation::AddAffinity { companion, .. } => *companion,
        }
    }

    fn at(&self) -> DateTime<Utc> {
        match self {
            StatsMutation::RecordFocusSession { at, .. }
            | StatsMutation::RecordMessage { at, .. }
            | StatsMutation::RecordGoalCompleted { at, .. }
            | StatsMutation::AddAffinity { at, .. } => *at,
        }
    }

    fn affinity(&self) -> u32 {
        match self {
            StatsMutation::RecordFocusSession { minutes, .. } => minutes / MINUTES_PER_AFFINITY,
            StatsMutation::RecordMessage { .. } => MESSAGE_AFFINITY,
            StatsMutation::RecordGoalCompleted { .. } => GOAL_AFFINITY,
            StatsMutation::AddAffinity { points, .. } => *points,
        }
    }

    /// Counter deltas as `(field, amount)` pairs.
    fn counters(&self) -> Vec<(&'static str, u32)> {
        let mut counters = vec![("affinity", self.affinity())];
        match self {
            StatsMutation::RecordFocusSession { minutes, .. } => {
                counters.push(("focus_minutes", *minutes));
                counters.push(("sessions_completed", 1));
            }
            StatsMutation::RecordMessage { .. } => counters.push(("messages_sent", 1)),
            StatsMutation::RecordGoalCompleted { .. } => counters.push(("goals_completed", 1)),
            StatsMutation::AddAffinity { .. } => {}
        }
        counters.retain(|(_, amount)| *amount > 0);
        counters
    }

    /// Apply to a profile; returns the new streak if it grew.
    fn apply(&self, profile: &mut CompanionProfile) -> Option<u32> {
        for (field, amount) in self.counters() {
            let counter = match field {
                "affinity" => &mut profile.affinity,
                "focus_minutes" => &mut profile.focus_minutes,
                "sessions_completed" => &mut profile.sessions_completed,
                "messages_sent" => &mut profile.messages_sent,
                "goals_completed" => &mut profile.goals_completed,
                _ => continue,
            };
            *counter = counter.saturating_add(amount);
        }
        profile.updated_at = self.at();
        let StatsMutation::RecordFocusSession { day, .. } = self else {
            return None;
        };
        if profile.last_session_on.is_some_and(|last| last > *day) {
            return None;
        }
        let streak = profile.next_streak(*day);
        let grew = streak > profile.streak_days;
        profile.streak_days = streak;
        profile.last_session_on = Some(*day);
        grew.then_some(streak)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAdapter;

impl StatsAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DomainAdapter for StatsAdapter {
    type Record = CompanionProfile;
    type Mutation = StatsMutation;

    const NAMESPACE: &'static str = "stats";

    fn apply_local(
        &self,
        cache: &mut LocalCache<CompanionProfile>,
        mutation: &StatsMutation,
        _now: DateTime<Utc>,
    ) {
        let companion = mutation.companion();
        let mut profile = cache
            .find(companion.as_str())
            .cloned()
            .unwrap_or_else(|| CompanionProfile::new(companion, mutation.at()));
        mutation.apply(&mut profile);
        cache.upsert_one(profile);
    }

    fn touched_identity(&self, mutation: &StatsMutation) -> Option<RecordId> {
        Some(mutation.companion().as_str().to_string())
    }

    async fn replay(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
        entry: &PendingMutation<StatsMutation>,
    ) -> Result<Vec<DomainEvent>, RemoteError> {
        let mutation = &entry.mutation;
        let companion = mutation.companion();
        let path = paths::profiles(owner).doc(companion.as_str());
        let fetched = fetch::<CompanionProfile>(remote, &path).await?;
        if fetched.applied(&entry.id) {
            debug!(
                "stats mutation already applied; confirming (path={path}, mutation={})",
                entry.id
            );
            let days = fetched.record.as_ref().map(|profile| profile.streak_days);
            return Ok(match days {
                Some(days) if fetched.caused_by(STREAK_EXTENDED_BY, &entry.id) => {
                    vec![DomainEvent::StreakExtended { companion, days }]
                }
                _ => Vec::new(),
            });
        }

        let mut updates = vec![
            applied_mark(&entry.id),
            FieldUpdate::set("companion", companion.as_str()),
            FieldUpdate::set("updated_at", timestamp_value(mutation.at())),
        ];
        for (field, amount) in mutation.counters() {
            updates.push(FieldUpdate::increment(field, i64::from(amount)));
        }

        let mut events = Vec::new();
        if let StatsMutation::RecordFocusSession { .. } = mutation {
            let mut profile = fetched
                .record
                .unwrap_or_else(|| CompanionProfile::new(companion, mutation.at()));
            if let Some(days) = mutation.apply(&mut profile) {
                updates.push(FieldUpdate::set(STREAK_EXTENDED_BY, entry.id.as_str()));
                events.push(DomainEvent::StreakExtended { companion, days });
            }
            updates.push(FieldUpdate::set("streak_days", profile.streak_days));
            if let Some(day) = profile.last_session_on {
                updates.push(FieldUpdate::set("last_session_on", day.to_string()));
            }
        }
        remote.update(&path, &updates).await?;
        Ok(events)
    }

    async fn pull(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
    ) -> Result<Option<Vec<CompanionProfile>>, RemoteError> {
        let documents = remote
            .query(&paths::profiles(owner), &Query::new())
            .await?;
        Ok(Some(decode_all(&documents)))
    }

    fn merge(
        &self,
        local: Vec<CompanionProfile>,
        remote: Vec<CompanionProfile>,
        unconfirmed: &HashSet<RecordId>,
    ) -> Vec<CompanionProfile> {
        merge_by_identity(local, remote, unconfirmed, true, |local, mut remote| {
            remote.affinity = remote.affinity.max(local.affinity);
            remote.messages_sent = remote.messages_sent.max(local.messages_sent);
            remote.focus_minutes = remote.focus_minutes.max(local.focus_minutes);
            remote.sessions_completed = remote.sessions_completed.max(local.sessions_completed);
            remote.goals_completed = remote.goals_completed.max(local.goals_completed);
            if local.last_session_on > remote.last_session_on {
                remote.last_session_on = local.last_session_on;
                remote.streak_days = local.streak_days;
            }
            remote
        })
    }

    fn on_event(
        &self,
        event: &DomainEvent,
        _cache: &LocalCache<CompanionProfile>,
        now: DateTime<Utc>,
    ) -> Vec<StatsMutation> {
        let mutation = match event {
            DomainEvent::FocusSessionCompleted {
                companion,
                minutes,
                completed_at,
            } => StatsMutation::RecordFocusSession {
                companion: *companion,
                minutes: *minutes,
                day: completed_at.date_naive(),
                at: *completed_at,
            },
            DomainEvent::MessageSent { companion, .. } => StatsMutation::RecordMessage {
                companion: *companion,
                at: now,
            },
            DomainEvent::GoalCompleted { companion, .. } => StatsMutation::RecordGoalCompleted {
                companion: *companion,
                at: now,
            },
            _ => return Vec::new(),
        };
        vec![mutation]
    }
}
