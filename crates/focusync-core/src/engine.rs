//! Generic optimistic store: local cache, pending queue and deferred sync.
//!
//! Mutations apply to the cache immediately and are queued. [`SyncedStore::sync`]
//! replays the queue against the remote store one mutation at a time, pulls
//! fresh data and merges it, never letting a remote read overwrite a record
//! that still has unconfirmed local changes.

use crate::cache::{Entity, LocalCache};
use crate::error::FocusyncError;
use crate::events::{DomainEventSink, EventBus};
use crate::meta::SyncMetadata;
use crate::queue::{PendingMutation, PendingQueue};
use crate::snapshot::{SNAPSHOT_SCHEMA_VERSION, SnapshotError, SnapshotStore, StoreSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use focusync_protocol::{Clock, DomainEvent, EventEnvelope, OwnerId, RecordId, SystemClock};
use focusync_remote::{RemoteError, RemoteStore};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Domain-specific behavior plugged into a [`SyncedStore`].
#[async_trait]
pub trait DomainAdapter: Send + Sync + 'static {
    type Record: Entity;
    type Mutation: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Snapshot namespace and log label.
    const NAMESPACE: &'static str;

    /// Apply a mutation's effect to the local cache.
    fn apply_local(
        &self,
        cache: &mut LocalCache<Self::Record>,
        mutation: &Self::Mutation,
        now: DateTime<Utc>,
    );

    /// Identity of the record the mutation creates or modifies.
    fn touched_identity(&self, mutation: &Self::Mutation) -> Option<RecordId>;

    /// Push one queued mutation to the remote store, returning events it
    /// caused. Replaying an entry whose write already landed must not apply
    /// it twice.
    async fn replay(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
        entry: &PendingMutation<Self::Mutation>,
    ) -> Result<Vec<DomainEvent>, RemoteError>;

    /// Fetch the remote view of this domain. `None` skips the merge.
    async fn pull(
        &self,
        _remote: &dyn RemoteStore,
        _owner: &OwnerId,
    ) -> Result<Option<Vec<Self::Record>>, RemoteError> {
        Ok(None)
    }

    /// Combine local and remote records. Records in `unconfirmed` must keep
    /// their local version.
    fn merge(
        &self,
        local: Vec<Self::Record>,
        remote: Vec<Self::Record>,
        unconfirmed: &HashSet<RecordId>,
    ) -> Vec<Self::Record>;

    /// Mutations implied by the passage of time, such as expiring goals.
    fn sweep(
        &self,
        _cache: &LocalCache<Self::Record>,
        _now: DateTime<Utc>,
    ) -> Vec<Self::Mutation> {
        Vec::new()
    }

    /// Translate another domain's event into local mutations.
    fn on_event(
        &self,
        _event: &DomainEvent,
        _cache: &LocalCache<Self::Record>,
        _now: DateTime<Utc>,
    ) -> Vec<Self::Mutation> {
        Vec::new()
    }
}

/// Cooldown and pull behavior of one store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSettings {
    pub cooldown: TimeDelta,
    pub pull_on_sync: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cooldown: TimeDelta::seconds(60),
            pull_on_sync: true,
        }
    }
}

/// Collaborators shared by every store of a service.
#[derive(Clone)]
pub struct StoreContext {
    pub remote: Arc<dyn RemoteStore>,
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

impl StoreContext {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            snapshots: None,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
        }
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

/// How a sync attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Queue flushed and remote state merged.
    Completed,
    /// Skipped without contacting the remote store.
    RateLimited,
    /// Requested owner does not own the cache; the cache was invalidated.
    OwnerMismatch,
    /// A remote call failed; remaining mutations stay queued.
    Failed,
    /// The owner changed while the sync was in flight; results were dropped.
    Interrupted,
}

/// Result of one [`SyncedStore::sync`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Mutations confirmed by the remote store in this call.
    pub replayed: usize,
    /// Mutations still queued afterwards.
    pub remaining: usize,
    /// Records returned by the pull, if one ran.
    pub pulled: Option<usize>,
    pub events: Vec<DomainEvent>,
    pub error: Option<String>,
}

impl SyncReport {
    fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            replayed: 0,
            remaining: 0,
            pulled: None,
            events: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::Completed | SyncOutcome::RateLimited
        )
    }
}

/// Snapshot of a store's sync state for display.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStatus {
    pub namespace: &'static str,
    pub owner: Option<OwnerId>,
    pub records: usize,
    pub pending: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub syncing: bool,
}

struct StoreState<R, M> {
    meta: SyncMetadata,
    cache: LocalCache<R>,
    pending: PendingQueue<M>,
    last_error: Option<String>,
    /// Bumped on every owner switch so in-flight syncs can detect it.
    generation: u64,
}

impl<R, M> StoreState<R, M> {
    fn empty(owner: Option<OwnerId>, generation: u64) -> Self {
        Self {
            meta: SyncMetadata::for_owner(owner),
            cache: LocalCache::default(),
            pending: PendingQueue::default(),
            last_error: None,
            generation,
        }
    }
}

/// Optimistic cache of one domain for the signed-in owner.
pub struct SyncedStore<A: DomainAdapter> {
    adapter: A,
    context: StoreContext,
    settings: StoreSettings,
    state: Mutex<StoreState<A::Record, A::Mutation>>,
    /// Serializes sync calls; a second caller waits for the first.
    sync_gate: tokio::sync::Mutex<()>,
}

impl<A: DomainAdapter> SyncedStore<A> {
    /// Create a store for `owner`, restoring its snapshot when one exists.
    pub fn new(
        adapter: A,
        owner: Option<OwnerId>,
        context: StoreContext,
        settings: StoreSettings,
    ) -> Self {
        let store = Self {
            adapter,
            context,
            settings,
            state: Mutex::new(StoreState::empty(None, 0)),
            sync_gate: tokio::sync::Mutex::new(()),
        };
        store.switch_owner(owner);
        store
    }

    /// Create the store and attach it to the context's event bus.
    pub fn attached(
        adapter: A,
        owner: Option<OwnerId>,
        context: StoreContext,
        settings: StoreSettings,
    ) -> Arc<Self> {
        let events = context.events.clone();
        let store = Arc::new(Self::new(adapter, owner, context, settings));
        events.attach(&store);
        store
    }

    pub fn namespace(&self) -> &'static str {
        A::NAMESPACE
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.state.lock().meta.owner.clone()
    }

    /// Records of one collection, in chronological order.
    pub fn read(&self, key: &str) -> Vec<A::Record> {
        self.state.lock().cache.read(key).to_vec()
    }

    pub fn records(&self) -> Vec<A::Record> {
        self.state.lock().cache.records().cloned().collect()
    }

    pub fn find(&self, id: &str) -> Option<A::Record> {
        self.state.lock().cache.find(id).cloned()
    }

    pub fn pending(&self) -> Vec<PendingMutation<A::Mutation>> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().meta.last_sync_at
    }

    pub fn status(&self) -> StoreStatus {
        let syncing = self.sync_gate.try_lock().is_err();
        let state = self.state.lock();
        StoreStatus {
            namespace: A::NAMESPACE,
            owner: state.meta.owner.clone(),
            records: state.cache.len(),
            pending: state.pending.len(),
            last_sync_at: state.meta.last_sync_at,
            last_error: state.last_error.clone(),
            syncing,
        }
    }

    /// Apply a mutation locally and queue it for the next sync.
    pub fn mutate(&self, mutation: A::Mutation) -> Result<u64, FocusyncError> {
        let now = self.context.clock.now();
        let mut state = self.state.lock();
        if state.meta.owner.is_none() {
            return Err(FocusyncError::SignedOut);
        }
        self.adapter.apply_local(&mut state.cache, &mutation, now);
        let seq = state.pending.enqueue(mutation, now);
        debug!(
            "queued mutation (namespace={}, seq={}, pending={})",
            A::NAMESPACE,
            seq,
            state.pending.len()
        );
        self.persist(&state);
        Ok(seq)
    }

    /// Discard all state and load whatever was persisted for `owner`.
    ///
    /// The cache is empty for the new owner by the time this returns, unless a
    /// snapshot recorded for that same owner is restored.
    pub fn switch_owner(&self, owner: Option<OwnerId>) {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        if state.meta.owner != owner {
            info!(
                "switching store owner (namespace={}, from={:?}, to={:?})",
                A::NAMESPACE,
                state.meta.owner.as_ref().map(OwnerId::as_str),
                owner.as_ref().map(OwnerId::as_str)
            );
        }
        *state = StoreState::empty(owner.clone(), generation);
        if let Some(owner) = owner {
            if let Some(snapshot) = self.load_snapshot(&owner) {
                state.meta = snapshot.meta;
                state.cache = snapshot.cache;
                state.pending = snapshot.pending;
            }
        }
    }

    /// Flush queued mutations and refresh from the remote store.
    pub async fn sync(&self, owner: &OwnerId, force: bool) -> SyncReport {
        let _gate = self.sync_gate.lock().await;
        let now = self.context.clock.now();
        let generation = {
            let mut state = self.state.lock();
            if !state.meta.belongs_to(owner) {
                warn!(
                    "sync requested for a different owner; invalidating cache (namespace={}, owner={})",
                    A::NAMESPACE,
                    owner
                );
                let generation = state.generation + 1;
                *state = StoreState::empty(None, generation);
                return SyncReport::new(SyncOutcome::OwnerMismatch);
            }
            if !state
                .meta
                .should_contact(now, self.settings.cooldown, force)
            {
                debug!("sync rate limited (namespace={})", A::NAMESPACE);
                let mut report = SyncReport::new(SyncOutcome::RateLimited);
                report.remaining = state.pending.len();
                return report;
            }
            state.generation
        };

        let remote = self.context.remote.as_ref();
        let mut report = SyncReport::new(SyncOutcome::Completed);

        loop {
            let next = {
                let state = self.state.lock();
                if state.generation != generation {
                    return self.interrupted(report);
                }
                state.pending.front().cloned()
            };
            let Some(entry) = next else {
                break;
            };
            match self.adapter.replay(remote, owner, &entry).await {
                Ok(events) => {
                    let mut state = self.state.lock();
                    if state.generation != generation {
                        drop(state);
                        return self.interrupted(report);
                    }
                    state.pending.confirm(entry.seq);
                    self.persist(&state);
                    report.replayed += 1;
                    report.events.extend(events);
                }
                Err(err) => {
                    return self.fail(owner, generation, report, &err, "replay");
                }
            }
        }

        let pulled = if self.settings.pull_on_sync {
            match self.adapter.pull(remote, owner).await {
                Ok(pulled) => pulled,
                Err(err) => return self.fail(owner, generation, report, &err, "pull"),
            }
        } else {
            None
        };

        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            return self.interrupted(report);
        }
        if let Some(remote_records) = pulled {
            report.pulled = Some(remote_records.len());
            let unconfirmed = self.unconfirmed(&state.pending);
            let local: Vec<A::Record> = state.cache.records().cloned().collect();
            let merged = self.adapter.merge(local, remote_records, &unconfirmed);
            state.cache.replace_all(merged);
        }
        for mutation in self.adapter.sweep(&state.cache, now) {
            self.adapter.apply_local(&mut state.cache, &mutation, now);
            state.pending.enqueue(mutation, now);
        }
        state.meta.last_sync_at = Some(now);
        state.last_error = None;
        report.remaining = state.pending.len();
        self.persist(&state);
        drop(state);

        info!(
            "sync completed (namespace={}, owner={}, replayed={}, pulled={:?}, remaining={})",
            A::NAMESPACE,
            owner,
            report.replayed,
            report.pulled,
            report.remaining
        );
        self.context
            .events
            .publish_all(owner, report.events.iter().cloned());
        report
    }

    fn fail(
        &self,
        owner: &OwnerId,
        generation: u64,
        mut report: SyncReport,
        err: &RemoteError,
        stage: &str,
    ) -> SyncReport {
        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            return self.interrupted(report);
        }
        let message = err.to_string();
        warn!(
            "sync failed (namespace={}, owner={}, stage={}, remaining={}): {}",
            A::NAMESPACE,
            owner,
            stage,
            state.pending.len(),
            message
        );
        state.last_error = Some(message.clone());
        report.outcome = SyncOutcome::Failed;
        report.remaining = state.pending.len();
        report.error = Some(message);
        self.persist(&state);
        drop(state);
        // Mutations confirmed before the failure still produced their events.
        self.context
            .events
            .publish_all(owner, report.events.iter().cloned());
        report
    }

    fn interrupted(&self, mut report: SyncReport) -> SyncReport {
        info!(
            "sync interrupted by owner switch (namespace={})",
            A::NAMESPACE
        );
        report.outcome = SyncOutcome::Interrupted;
        report.events.clear();
        report
    }

    fn unconfirmed(&self, pending: &PendingQueue<A::Mutation>) -> HashSet<RecordId> {
        pending
            .iter()
            .filter_map(|entry| self.adapter.touched_identity(&entry.mutation))
            .collect()
    }

    fn load_snapshot(
        &self,
        owner: &OwnerId,
    ) -> Option<StoreSnapshot<A::Record, A::Mutation>> {
        let snapshots = self.context.snapshots.as_ref()?;
        let raw = match snapshots.load(A::NAMESPACE) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(
                    "failed to load snapshot (namespace={}): {err}",
                    A::NAMESPACE
                );
                return None;
            }
        };
        let snapshot: StoreSnapshot<A::Record, A::Mutation> = match serde_json::from_value(raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    "invalid snapshot ignored (namespace={}): {err}",
                    A::NAMESPACE
                );
                return None;
            }
        };
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            warn!(
                "unsupported snapshot schema ignored (namespace={}, version={})",
                A::NAMESPACE,
                snapshot.schema_version
            );
            return None;
        }
        if !snapshot.meta.belongs_to(owner) {
            info!(
                "discarding snapshot recorded for another owner (namespace={})",
                A::NAMESPACE
            );
            if let Err(err) = snapshots.remove(A::NAMESPACE) {
                warn!(
                    "failed to remove stale snapshot (namespace={}): {err}",
                    A::NAMESPACE
                );
            }
            return None;
        }
        debug!(
            "restored snapshot (namespace={}, records={}, pending={})",
            A::NAMESPACE,
            snapshot.cache.len(),
            snapshot.pending.len()
        );
        Some(snapshot)
    }

    /// Write the current state; only an owned cache is ever persisted.
    fn persist(&self, state: &StoreState<A::Record, A::Mutation>) {
        let Some(snapshots) = self.context.snapshots.as_ref() else {
            return;
        };
        if state.meta.owner.is_none() {
            return;
        }
        let snapshot = SnapshotRef {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            meta: &state.meta,
            cache: &state.cache,
            pending: &state.pending,
        };
        let result = serde_json::to_value(&snapshot)
            .map_err(SnapshotError::from)
            .and_then(|value| snapshots.save(A::NAMESPACE, &value));
        if let Err(err) = result {
            warn!(
                "failed to persist snapshot (namespace={}): {err}",
                A::NAMESPACE
            );
        }
    }
}

/// Borrowed form of [`StoreSnapshot`] used when writing.
#[derive(Serialize)]
struct SnapshotRef<'a, R, M> {
    schema_version: u32,
    meta: &'a SyncMetadata,
    cache: &'a LocalCache<R>,
    pending: &'a PendingQueue<M>,
}

impl<A: DomainAdapter> DomainEventSink for SyncedStore<A> {
    fn handle(&self, envelope: &EventEnvelope) {
        let now = self.context.clock.now();
        let mut state = self.state.lock();
        if !state.meta.belongs_to(&envelope.owner) {
            return;
        }
        let mutations = self
            .adapter
            .on_event(&envelope.payload, &state.cache, now);
        if mutations.is_empty() {
            return;
        }
        debug!(
            "event produced local mutations (namespace={}, kind={}, count={})",
            A::NAMESPACE,
            envelope.payload.kind(),
            mutations.len()
        );
        for mutation in mutations {
            self.adapter.apply_local(&mut state.cache, &mutation, now);
            state.pending.enqueue(mutation, now);
        }
        self.persist(&state);
    }
}
