//! Focus goals: optimistic progress, completion and deadline expiry.

use super::{applied_mark, encode, fetch, merge_by_identity, timestamp_value};
use crate::cache::{Entity, LocalCache};
use crate::engine::DomainAdapter;
use crate::queue::PendingMutation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focusync_protocol::{DomainEvent, Goal, GoalStatus, OwnerId, RecordId};
use focusync_remote::{FieldUpdate, Query, RemoteError, RemoteStore, paths};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

impl Entity for Goal {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection(&self) -> String {
        self.companion.as_str().to_string()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Field changes for an active goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target_minutes: Option<u32>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_deadline: bool,
}

impl GoalEdit {
    /// Apply to an active goal; returns true when the new target completes it.
    fn apply(&self, goal: &mut Goal, at: DateTime<Utc>) -> bool {
        if goal.status.is_terminal() {
            return false;
        }
        if let Some(title) = &self.title {
            goal.title = title.clone();
        }
        if let Some(target) = self.target_minutes {
            goal.target_minutes = target;
        }
        if self.clear_deadline {
            goal.deadline = None;
        } else if let Some(deadline) = self.deadline {
            goal.deadline = Some(deadline);
        }
        if goal.current_minutes >= goal.target_minutes {
            return goal.complete(at);
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GoalMutation {
    Create(Goal),
    IncrementProgress {
        goal_id: RecordId,
        minutes: u32,
        at: DateTime<Utc>,
    },
    Complete {
        goal_id: RecordId,
        at: DateTime<Utc>,
    },
    Edit {
        goal_id: RecordId,
        edit: GoalEdit,
        at: DateTime<Utc>,
    },
    Remove {
        goal_id: RecordId,
    },
    Expire {
        goal_id: RecordId,
    },
}

impl GoalMutation {
    pub fn goal_id(&self) -> &str {
        match self {
            GoalMutation::Create(goal) => &goal.id,
            GoalMutation::IncrementProgress { goal_id, .. }
            | GoalMutation::Complete { goal_id, .. }
            | GoalMutation::Edit { goal_id, .. }
            | GoalMutation::Remove { goal_id }
            | GoalMutation::Expire { goal_id } => goal_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoalsAdapter;

impl GoalsAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn completed_event(goal: &Goal) -> DomainEvent {
    DomainEvent::GoalCompleted {
        goal_id: goal.id.clone(),
        companion: goal.companion,
        minutes: goal.current_minutes,
    }
}

/// Names the mutation whose write moved a goal out of `active`.
const CLOSED_BY: &str = "closed_by";

/// Status flip for a goal that just became terminal, attributed to `mutation_id`.
fn status_updates(goal: &Goal, mutation_id: &str) -> Vec<FieldUpdate> {
    let mut updates = vec![
        FieldUpdate::set(
            "status",
            serde_json::to_value(goal.status).unwrap_or_default(),
        ),
        FieldUpdate::set(CLOSED_BY, mutation_id),
    ];
    if let Some(completed_at) = goal.completed_at {
        updates.push(FieldUpdate::set(
            "completed_at",
            timestamp_value(completed_at),
        ));
    }
    updates
}

/// Event for the terminal transition a goal went through.
fn closed_event(goal: &Goal) -> Option<DomainEvent> {
    match goal.status {
        GoalStatus::Completed => Some(completed_event(goal)),
        GoalStatus::Expired => Some(DomainEvent::GoalExpired {
            goal_id: goal.id.clone(),
            companion: goal.companion,
        }),
        GoalStatus::Active => None,
    }
}

#[async_trait]
impl DomainAdapter for GoalsAdapter {
    type Record = Goal;
    type Mutation = GoalMutation;

    const NAMESPACE: &'static str = "goals";

    fn apply_local(
        &self,
        cache: &mut LocalCache<Goal>,
        mutation: &GoalMutation,
        _now: DateTime<Utc>,
    ) {
        match mutation {
            GoalMutation::Create(goal) => {
                cache.upsert_one(goal.clone());
            }
            GoalMutation::IncrementProgress {
                goal_id,
                minutes,
                at,
            } => {
                cache.update(goal_id, |goal| goal.apply_progress(*minutes, *at));
            }
            GoalMutation::Complete { goal_id, at } => {
                cache.update(goal_id, |goal| goal.complete(*at));
            }
            GoalMutation::Edit { goal_id, edit, at } => {
                cache.update(goal_id, |goal| edit.apply(goal, *at));
            }
            GoalMutation::Remove { goal_id } => {
                if let Some(key) = cache.find(goal_id).map(|goal| goal.collection()) {
                    cache.remove(&key, goal_id);
                }
            }
            GoalMutation::Expire { goal_id } => {
                cache.update(goal_id, Goal::expire);
            }
        }
    }

    fn touched_identity(&self, mutation: &GoalMutation) -> Option<RecordId> {
        Some(mutation.goal_id().to_string())
    }

    async fn replay(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
        entry: &PendingMutation<GoalMutation>,
    ) -> Result<Vec<DomainEvent>, RemoteError> {
        let mutation = &entry.mutation;
        let path = paths::goals(owner).doc(mutation.goal_id());
        match mutation {
            GoalMutation::Create(goal) => {
                remote.set(&path, encode(goal)?).await?;
                return Ok(Vec::new());
            }
            GoalMutation::Remove { .. } => {
                remote.delete(&path).await?;
                return Ok(Vec::new());
            }
            _ => {}
        }

        let fetched = fetch::<Goal>(remote, &path).await?;
        let Some(mut goal) = fetched.record.clone() else {
            warn!("goal missing remotely; dropping mutation (path={path})");
            return Ok(Vec::new());
        };
        if fetched.applied(&entry.id) {
            debug!(
                "goal mutation already applied; confirming (path={path}, mutation={})",
                entry.id
            );
            if fetched.caused_by(CLOSED_BY, &entry.id) {
                return Ok(closed_event(&goal).into_iter().collect());
            }
            return Ok(Vec::new());
        }
        if goal.status.is_terminal() {
            debug!("goal already terminal; skipping mutation (path={path})");
            return Ok(Vec::new());
        }

        let mut updates = vec![applied_mark(&entry.id)];
        let closed = match mutation {
            GoalMutation::IncrementProgress { minutes, at, .. } => {
                // Increment and completion flip go out in one write.
                updates.push(FieldUpdate::increment(
                    "current_minutes",
                    i64::from(*minutes),
                ));
                goal.apply_progress(*minutes, *at)
            }
            GoalMutation::Complete { at, .. } => goal.complete(*at),
            GoalMutation::Edit { edit, at, .. } => {
                let completed = edit.apply(&mut goal, *at);
                updates.extend([
                    FieldUpdate::set("title", goal.title.clone()),
                    FieldUpdate::set("target_minutes", goal.target_minutes),
                    FieldUpdate::set(
                        "deadline",
                        goal.deadline.map(timestamp_value).unwrap_or_default(),
                    ),
                ]);
                completed
            }
            GoalMutation::Expire { .. } => goal.expire(),
            GoalMutation::Create(_) | GoalMutation::Remove { .. } => false,
        };
        if closed {
            updates.extend(status_updates(&goal, &entry.id));
        }
        remote.update(&path, &updates).await?;
        Ok(if closed {
            closed_event(&goal).into_iter().collect()
        } else {
            Vec::new()
        })
    }

    async fn pull(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
    ) -> Result<Option<Vec<Goal>>, RemoteError> {
        let documents = remote.query(&paths::goals(owner), &Query::new()).await?;
        Ok(Some(super::decode_all(&documents)))
    }

    fn merge(
        &self,
        local: Vec<Goal>,
        remote: Vec<Goal>,
        unconfirmed: &HashSet<RecordId>,
    ) -> Vec<Goal> {
        merge_by_identity(local, remote, unconfirmed, false, |local, mut remote| {
            remote.current_minutes = remote.current_minutes.max(local.current_minutes);
            if local.status.is_terminal() && remote.status == GoalStatus::Active {
                remote.status = local.status;
                remote.completed_at = local.completed_at;
            }
            remote
        })
    }

    fn sweep(&self, cache: &LocalCache<Goal>, now: DateTime<Utc>) -> Vec<GoalMutation> {
        cache
            .records()
            .filter(|goal| goal.is_overdue(now))
            .map(|goal| GoalMutation::Expire {
                goal_id: goal.id.clone(),
            })
            .collect()
    }

    fn on_event(
        &self,
        event: &DomainEvent,
        cache: &LocalCache<Goal>,
        _now: DateTime<Utc>,
    ) -> Vec<GoalMutation> {
        let DomainEvent::FocusSessionCompleted {
            companion,
            minutes,
            completed_at,
        } = event
        else {
            return Vec::new();
        };
        cache
            .read(companion.as_str())
            .iter()
            .filter(|goal| goal.is_active())
            .map(|goal| GoalMutation::IncrementProgress {
                goal_id: goal.id.clone(),
                minutes: *minutes,
                at: *completed_at,
            })
            .collect()
    }
}
