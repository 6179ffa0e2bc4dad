//! Optimistic local caches with deferred remote sync.
//!
//! Each domain (goals, chat, achievements, companion stats) is a
//! [`SyncedStore`] over a [`DomainAdapter`]. Stores react to each other's
//! [`DomainEvent`](focusync_protocol::DomainEvent)s through the [`EventBus`],
//! and [`FocusServices`] ties them to one signed-in owner.

pub mod cache;
pub mod companion;
pub mod domains;
pub mod engine;
pub mod error;
pub mod events;
pub mod meta;
pub mod queue;
pub mod services;
pub mod snapshot;
pub mod timer;

pub use cache::{Entity, LocalCache};
pub use companion::{CompanionChat, CompanionReply, FallbackReason, build_openai_provider};
pub use engine::{
    DomainAdapter, StoreContext, StoreSettings, StoreStatus, SyncOutcome, SyncReport, SyncedStore,
};
pub use error::FocusyncError;
pub use events::{DomainEventSink, EventBus};
pub use meta::SyncMetadata;
pub use queue::{PendingMutation, PendingQueue};
pub use services::{FocusServices, PeriodicSync, ServiceDeps, SyncAllReport, open_snapshot_store};
pub use snapshot::{JsonFileSnapshotStore, MemorySnapshotStore, SnapshotError, SnapshotStore};
pub use timer::{FocusTimer, PhaseCompleted, TimerState};
