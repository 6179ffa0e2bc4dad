//! Service facade owning the four stores, the event bus and the chat client.

use crate::companion::{CompanionChat, CompanionReply, FallbackReason, HistoryLimits};
use crate::domains::{
    AchievementsAdapter, ChatAdapter, ChatMutation, GoalEdit, GoalMutation, GoalsAdapter,
    StatsAdapter,
};
use crate::engine::{StoreContext, StoreSettings, StoreStatus, SyncReport, SyncedStore};
use crate::error::FocusyncError;
use crate::events::EventBus;
use crate::meta::cooldown_from_secs;
use crate::snapshot::{JsonFileSnapshotStore, SnapshotStore};
use crate::timer::PhaseCompleted;
use autoagents_llm::LLMProvider;
use chrono::{DateTime, Utc};
use focusync_config::{DomainSyncConfig, FocusyncConfig, StorageConfig};
use focusync_protocol::{
    ChatMessage, Clock, Companion, DomainEvent, Goal, OwnerId, Speaker, SystemClock,
};
use focusync_remote::RemoteStore;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// External collaborators for [`FocusServices`].
#[derive(Clone)]
pub struct ServiceDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
    pub llm: Option<Arc<dyn LLMProvider>>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDeps {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            snapshots: None,
            llm: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Open the snapshot store described by the storage config.
pub fn open_snapshot_store(
    config: &StorageConfig,
) -> Result<Option<Arc<dyn SnapshotStore>>, FocusyncError> {
    if !config.enabled {
        return Ok(None);
    }
    let store = match &config.path {
        Some(path) => JsonFileSnapshotStore::new(path)?,
        None => JsonFileSnapshotStore::open_default()?,
    };
    Ok(Some(Arc::new(store)))
}

/// Per-store results of [`FocusServices::sync_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAllReport {
    pub chat: SyncReport,
    pub goals: SyncReport,
    pub stats: SyncReport,
    pub achievements: SyncReport,
}

impl SyncAllReport {
    pub fn is_success(&self) -> bool {
        [&self.chat, &self.goals, &self.stats, &self.achievements]
            .iter()
            .all(|report| report.is_success())
    }
}

fn settings(config: &DomainSyncConfig) -> StoreSettings {
    StoreSettings {
        cooldown: cooldown_from_secs(config.cooldown_secs),
        pull_on_sync: config.pull_on_sync,
    }
}

pub struct FocusServices {
    owner: RwLock<Option<OwnerId>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    periodic_interval: Duration,
    goals: Arc<SyncedStore<GoalsAdapter>>,
    chat: Arc<SyncedStore<ChatAdapter>>,
    achievements: Arc<SyncedStore<AchievementsAdapter>>,
    stats: Arc<SyncedStore<StatsAdapter>>,
    companion_chat: Option<CompanionChat>,
}

impl FocusServices {
    pub fn new(config: &FocusyncConfig, owner: Option<OwnerId>, deps: ServiceDeps) -> Self {
        let events = EventBus::default();
        let mut context = StoreContext::new(deps.remote)
            .with_clock(deps.clock.clone())
            .with_events(events.clone());
        if let Some(snapshots) = deps.snapshots {
            context = context.with_snapshots(snapshots);
        }
        let sync = &config.sync;
        let goals = SyncedStore::attached(
            GoalsAdapter::new(),
            owner.clone(),
            context.clone(),
            settings(&sync.goals),
        );
        let chat = SyncedStore::attached(
            ChatAdapter::new(config.chat.pull_limit),
            owner.clone(),
            context.clone(),
            settings(&sync.chat),
        );
        let achievements = SyncedStore::attached(
            AchievementsAdapter::new(),
            owner.clone(),
            context.clone(),
            settings(&sync.achievements),
        );
        let stats = SyncedStore::attached(
            StatsAdapter::new(),
            owner.clone(),
            context,
            settings(&sync.stats),
        );
        let companion_chat = deps
            .llm
            .map(|llm| CompanionChat::new(llm, HistoryLimits::from(&config.chat)));
        info!(
            "focus services ready (owner={:?}, chat_enabled={})",
            owner.as_ref().map(OwnerId::as_str),
            companion_chat.is_some()
        );
        Self {
            owner: RwLock::new(owner),
            events,
            clock: deps.clock,
            periodic_interval: Duration::from_secs(sync.periodic_interval_secs.max(1)),
            goals,
            chat,
            achievements,
            stats,
            companion_chat,
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner.read().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn goals(&self) -> &Arc<SyncedStore<GoalsAdapter>> {
        &self.goals
    }

    pub fn chat(&self) -> &Arc<SyncedStore<ChatAdapter>> {
        &self.chat
    }

    pub fn achievements(&self) -> &Arc<SyncedStore<AchievementsAdapter>> {
        &self.achievements
    }

    pub fn stats(&self) -> &Arc<SyncedStore<StatsAdapter>> {
        &self.stats
    }

    pub fn sign_in(&self, owner: OwnerId) {
        self.switch_owner(Some(owner));
    }

    pub fn sign_out(&self) {
        self.switch_owner(None);
    }

    /// Point every store at `owner`. No store exposes the previous owner's
    /// records once this returns.
    pub fn switch_owner(&self, owner: Option<OwnerId>) {
        let mut current = self.owner.write();
        self.goals.switch_owner(owner.clone());
        self.chat.switch_owner(owner.clone());
        self.achievements.switch_owner(owner.clone());
        self.stats.switch_owner(owner.clone());
        *current = owner;
    }

    fn require_owner(&self) -> Result<OwnerId, FocusyncError> {
        self.owner().ok_or(FocusyncError::SignedOut)
    }

    /// Sync every store. Producers go first so the events they publish are
    /// flushed by the consuming stores in the same pass.
    pub async fn sync_all(&self, force: bool) -> Result<SyncAllReport, FocusyncError> {
        let owner = self.require_owner()?;
        let chat = self.chat.sync(&owner, force).await;
        let goals = self.goals.sync(&owner, force).await;
        let stats = self.stats.sync(&owner, force).await;
        let achievements = self.achievements.sync(&owner, force).await;
        let report = SyncAllReport {
            chat,
            goals,
            stats,
            achievements,
        };
        if !report.is_success() {
            warn!("sync pass finished with failures (owner={owner})");
        }
        Ok(report)
    }

    pub fn statuses(&self) -> Vec<StoreStatus> {
        vec![
            self.chat.status(),
            self.goals.status(),
            self.stats.status(),
            self.achievements.status(),
        ]
    }

    /// Credit a finished focus session to a companion.
    pub fn complete_focus_session(
        &self,
        companion: Companion,
        minutes: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), FocusyncError> {
        let owner = self.require_owner()?;
        self.events.publish(
            &owner,
            DomainEvent::FocusSessionCompleted {
                companion,
                minutes,
                completed_at,
            },
        );
        Ok(())
    }

    /// Publish the event for a completed timer phase, if it was a focus phase.
    pub fn record_phase(&self, completed: &PhaseCompleted) -> Result<bool, FocusyncError> {
        let Some(DomainEvent::FocusSessionCompleted {
            companion,
            minutes,
            completed_at,
        }) = completed.focus_event()
        else {
            return Ok(false);
        };
        self.complete_focus_session(companion, minutes, completed_at)?;
        Ok(true)
    }

    pub fn create_goal(
        &self,
        companion: Companion,
        title: impl Into<String>,
        target_minutes: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Goal, FocusyncError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(FocusyncError::Invalid("goal title is empty".to_string()));
        }
        if target_minutes == 0 {
            return Err(FocusyncError::Invalid(
                "goal target must be positive".to_string(),
            ));
        }
        let goal = Goal::new(companion, title, target_minutes, deadline, self.clock.now());
        self.goals.mutate(GoalMutation::Create(goal.clone()))?;
        Ok(goal)
    }

    pub fn add_goal_progress(&self, goal_id: &str, minutes: u32) -> Result<(), FocusyncError> {
        self.ensure_goal(goal_id)?;
        self.goals.mutate(GoalMutation::IncrementProgress {
            goal_id: goal_id.to_string(),
            minutes,
            at: self.clock.now(),
        })?;
        Ok(())
    }

    pub fn complete_goal(&self, goal_id: &str) -> Result<(), FocusyncError> {
        self.ensure_goal(goal_id)?;
        self.goals.mutate(GoalMutation::Complete {
            goal_id: goal_id.to_string(),
            at: self.clock.now(),
        })?;
        Ok(())
    }

    pub fn edit_goal(&self, goal_id: &str, edit: GoalEdit) -> Result<(), FocusyncError> {
        self.ensure_goal(goal_id)?;
        self.goals.mutate(GoalMutation::Edit {
            goal_id: goal_id.to_string(),
            edit,
            at: self.clock.now(),
        })?;
        Ok(())
    }

    pub fn remove_goal(&self, goal_id: &str) -> Result<(), FocusyncError> {
        self.ensure_goal(goal_id)?;
        self.goals.mutate(GoalMutation::Remove {
            goal_id: goal_id.to_string(),
        })?;
        Ok(())
    }

    fn ensure_goal(&self, goal_id: &str) -> Result<(), FocusyncError> {
        if self.goals.find(goal_id).is_none() {
            return Err(FocusyncError::UnknownRecord(goal_id.to_string()));
        }
        Ok(())
    }

    /// Conversation with a companion, oldest first.
    pub fn chat_history(&self, companion: Companion) -> Vec<ChatMessage> {
        self.chat.read(companion.as_str())
    }

    pub fn clear_chat_history(&self, companion: Companion) -> Result<(), FocusyncError> {
        self.chat.mutate(ChatMutation::ClearHistory {
            companion,
            before: self.clock.now(),
        })?;
        Ok(())
    }

    /// Record the user's message, ask the companion and record its reply.
    ///
    /// Both messages are applied optimistically; they reach the remote store on
    /// the next chat sync.
    pub async fn send_chat_message(
        &self,
        companion: Companion,
        text: &str,
    ) -> Result<CompanionReply, FocusyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FocusyncError::Invalid("message is empty".to_string()));
        }
        let owner = self.require_owner()?;
        let history = self.chat_history(companion);
        let user_message = ChatMessage::new(companion, Speaker::User, text, self.clock.now());
        self.chat.mutate(ChatMutation::Append(user_message))?;

        let reply = match &self.companion_chat {
            Some(client) => client.reply(companion, &history, text).await,
            None => CompanionReply::fallback(companion, FallbackReason::Unavailable),
        };

        if self.owner().as_ref() != Some(&owner) {
            debug!("owner changed while awaiting reply; dropping companion message");
            return Ok(reply);
        }
        let reply_message =
            ChatMessage::new(companion, Speaker::Companion, &reply.text, self.clock.now());
        self.chat.mutate(ChatMutation::Append(reply_message))?;
        Ok(reply)
    }

    /// Run `sync_all(false)` on the configured interval until stopped.
    pub fn spawn_periodic_sync(self: &Arc<Self>) -> PeriodicSync {
        self.spawn_periodic_sync_every(self.periodic_interval)
    }

    pub fn spawn_periodic_sync_every(self: &Arc<Self>, interval: Duration) -> PeriodicSync {
        let (shutdown, mut stopped) = watch::channel(false);
        let services = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if services.owner().is_none() {
                            continue;
                        }
                        if let Err(err) = services.sync_all(false).await {
                            debug!("periodic sync skipped: {err}");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("periodic sync stopped");
        });
        info!("periodic sync started (interval_secs={})", interval.as_secs());
        PeriodicSync {
            shutdown,
            handle: Some(handle),
        }
    }
}

/// Handle to the background sync loop; dropping it stops the loop once the
/// current pass finishes.
pub struct PeriodicSync {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSync {
    /// Stop the loop and wait for the in-flight pass to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicSync {
    /// Signal the loop to exit after its in-flight pass. The task is not
    /// aborted, so a replay is never cut off between its remote write and
    /// the queue confirmation.
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
