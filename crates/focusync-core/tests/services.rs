//! End-to-end behavior of the focus services facade.

use autoagents_llm::chat::ChatRole;
use chrono::TimeDelta;
use focusync_config::{FocusyncConfig, TimerConfig};
use focusync_core::{
    FallbackReason, FocusServices, FocusTimer, FocusyncError, JsonFileSnapshotStore, ServiceDeps,
    SyncOutcome,
};
use focusync_protocol::{Clock, Companion, DomainEvent, GoalStatus, OwnerId, Speaker};
use focusync_remote::paths;
use focusync_test_utils::{InMemoryRemote, ManualClock, ScriptedLLM};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    remote: Arc<InMemoryRemote>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            remote: Arc::new(InMemoryRemote::new()),
            clock: Arc::new(ManualClock::fixed()),
        }
    }

    fn deps(&self) -> ServiceDeps {
        ServiceDeps::new(self.remote.clone()).with_clock(self.clock.clone())
    }

    fn services(&self, owner: Option<OwnerId>, deps: ServiceDeps) -> FocusServices {
        FocusServices::new(&FocusyncConfig::default(), owner, deps)
    }
}

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

#[tokio::test]
async fn focus_session_flows_into_goals_stats_and_achievements() {
    let fx = Fixture::new();
    let owner = alice();
    let services = fx.services(Some(owner.clone()), fx.deps());

    let goal = services
        .create_goal(Companion::Sage, "read a chapter", 20, None)
        .expect("goal");
    services
        .complete_focus_session(Companion::Sage, 25, fx.clock.now())
        .expect("session");

    let local_goal = services.goals().find(&goal.id).expect("goal");
    assert_eq!(local_goal.current_minutes, 25);
    assert_eq!(local_goal.status, GoalStatus::Completed);
    let profile = services.stats().find("sage").expect("profile");
    assert_eq!(profile.focus_minutes, 25);
    assert_eq!(profile.sessions_completed, 1);
    assert!(
        services
            .achievements()
            .find("first_focus")
            .is_some_and(|progress| progress.is_unlocked())
    );

    let mut events = services.events().subscribe();
    let report = services.sync_all(true).await.expect("sync");
    assert!(report.is_success(), "{report:?}");

    let remote_goal = fx
        .remote
        .document(&paths::goals(&owner).doc(&goal.id))
        .expect("remote goal");
    assert_eq!(remote_goal["status"], json!("completed"));
    let remote_profile = fx
        .remote
        .document(&paths::profiles(&owner).doc("sage"))
        .expect("remote profile");
    assert_eq!(remote_profile["focus_minutes"], json!(25));
    assert_eq!(remote_profile["goals_completed"], json!(1));
    assert_eq!(remote_profile["streak_days"], json!(1));
    for id in ["first_focus", "goal_getter"] {
        let remote_achievement = fx
            .remote
            .document(&paths::achievements(&owner).doc(id))
            .expect("remote achievement");
        assert!(remote_achievement["unlocked_at"].is_string(), "{id}");
    }

    let mut kinds = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        kinds.push(envelope.payload.kind());
    }
    assert!(kinds.contains(&"goal_completed"));
    assert!(kinds.contains(&"streak_extended"));
    assert!(kinds.contains(&"achievement_unlocked"));
}

#[tokio::test]
async fn timer_phase_credits_the_active_companion() {
    let fx = Fixture::new();
    let services = fx.services(Some(alice()), fx.deps());
    let mut timer = FocusTimer::new(TimerConfig::default(), Companion::Spark);

    let started = fx.clock.now();
    assert!(timer.start(started));
    let finished = timer
        .tick(started + TimeDelta::minutes(25))
        .expect("phase completes");
    assert!(services.record_phase(&finished).expect("record"));

    let profile = services.stats().find("spark").expect("profile");
    assert_eq!(profile.focus_minutes, 25);
    assert_eq!(profile.affinity, 5);

    let short_break = {
        assert!(timer.start(finished.completed_at));
        timer
            .tick(finished.completed_at + TimeDelta::minutes(5))
            .expect("break completes")
    };
    assert!(!services.record_phase(&short_break).expect("record"));
}

#[tokio::test]
async fn chat_reply_is_recorded_after_the_user_message() {
    let fx = Fixture::new();
    let llm = ScriptedLLM::replying("One page at a time.");
    let services = fx.services(Some(alice()), fx.deps().with_llm(Arc::new(llm.clone())));

    let reply = services
        .send_chat_message(Companion::Sage, "  I keep getting distracted  ")
        .await
        .expect("reply");
    assert_eq!(reply.text, "One page at a time.");
    assert!(!reply.is_fallback());

    let history = services.chat_history(Companion::Sage);
    let turns: Vec<(Speaker, &str)> = history
        .iter()
        .map(|message| (message.speaker, message.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Speaker::User, "I keep getting distracted"),
            (Speaker::Companion, "One page at a time."),
        ]
    );

    assert_eq!(llm.call_count(), 1);
    let prompt = llm.last_prompt();
    assert!(matches!(prompt.first().map(|m| &m.role), Some(ChatRole::System)));
    assert_eq!(
        prompt.last().map(|m| m.content.as_str()),
        Some("I keep getting distracted")
    );
}

#[tokio::test]
async fn chat_falls_back_to_persona_lines() {
    let fx = Fixture::new();

    let failing = fx.services(
        Some(alice()),
        fx.deps().with_llm(Arc::new(ScriptedLLM::failing("socket closed"))),
    );
    let reply = failing
        .send_chat_message(Companion::Ember, "hi")
        .await
        .expect("reply");
    assert!(matches!(reply.fallback, Some(FallbackReason::Provider(_))));
    assert_eq!(failing.chat_history(Companion::Ember).len(), 2);

    let silent = fx.services(
        Some(alice()),
        fx.deps().with_llm(Arc::new(ScriptedLLM::silent())),
    );
    let reply = silent
        .send_chat_message(Companion::Tide, "hi")
        .await
        .expect("reply");
    assert_eq!(reply.fallback, Some(FallbackReason::Empty));

    let offline = fx.services(Some(alice()), fx.deps());
    let reply = offline
        .send_chat_message(Companion::Spark, "hi")
        .await
        .expect("reply");
    assert_eq!(reply.fallback, Some(FallbackReason::Unavailable));
}

#[tokio::test]
async fn signed_out_operations_are_rejected() {
    let fx = Fixture::new();
    let services = fx.services(None, fx.deps());

    assert!(matches!(
        services.sync_all(false).await,
        Err(FocusyncError::SignedOut)
    ));
    assert!(matches!(
        services.create_goal(Companion::Sage, "write", 30, None),
        Err(FocusyncError::SignedOut)
    ));
    assert!(matches!(
        services.send_chat_message(Companion::Sage, "hi").await,
        Err(FocusyncError::SignedOut)
    ));
    assert_eq!(fx.remote.call_count(), 0);
}

#[tokio::test]
async fn goal_operations_validate_input() {
    let fx = Fixture::new();
    let services = fx.services(Some(alice()), fx.deps());

    assert!(matches!(
        services.create_goal(Companion::Sage, "   ", 30, None),
        Err(FocusyncError::Invalid(_))
    ));
    assert!(matches!(
        services.create_goal(Companion::Sage, "write", 0, None),
        Err(FocusyncError::Invalid(_))
    ));
    assert!(matches!(
        services.add_goal_progress("missing", 5),
        Err(FocusyncError::UnknownRecord(_))
    ));

    let goal = services
        .create_goal(Companion::Sage, "write", 30, None)
        .expect("goal");
    services.remove_goal(&goal.id).expect("remove");
    assert!(services.goals().find(&goal.id).is_none());
}

#[tokio::test]
async fn switching_owner_hides_previous_records_immediately() {
    let fx = Fixture::new();
    let dir = TempDir::new().expect("tmp");
    let snapshots = Arc::new(JsonFileSnapshotStore::new(dir.path()).expect("snapshots"));
    let services = fx.services(Some(alice()), fx.deps().with_snapshots(snapshots));

    services
        .create_goal(Companion::Sage, "alice's goal", 30, None)
        .expect("goal");
    services
        .send_chat_message(Companion::Sage, "hello")
        .await
        .expect("reply");
    services
        .complete_focus_session(Companion::Sage, 25, fx.clock.now())
        .expect("session");

    services.sign_in(OwnerId::new("bob"));

    assert_eq!(fx.remote.call_count(), 0);
    for status in services.statuses() {
        assert_eq!(status.records, 0, "{}", status.namespace);
        assert_eq!(status.pending, 0, "{}", status.namespace);
    }
    assert!(services.chat_history(Companion::Sage).is_empty());

    let report = services.sync_all(true).await.expect("sync");
    assert_eq!(report.goals.outcome, SyncOutcome::Completed);
    assert!(fx.remote.documents_in(&paths::goals(&alice())).is_empty());
}

#[tokio::test]
async fn restart_restores_unsynced_work_for_the_same_owner() {
    let fx = Fixture::new();
    let dir = TempDir::new().expect("tmp");
    let goal = {
        let snapshots = Arc::new(JsonFileSnapshotStore::new(dir.path()).expect("snapshots"));
        let services = fx.services(Some(alice()), fx.deps().with_snapshots(snapshots));
        services
            .create_goal(Companion::Tide, "journal", 15, None)
            .expect("goal")
    };

    let snapshots = Arc::new(JsonFileSnapshotStore::new(dir.path()).expect("snapshots"));
    let services = fx.services(Some(alice()), fx.deps().with_snapshots(snapshots));
    assert_eq!(services.goals().find(&goal.id), Some(goal.clone()));
    assert_eq!(services.goals().pending_len(), 1);

    services.sync_all(false).await.expect("sync");
    assert!(
        fx.remote
            .document(&paths::goals(&alice()).doc(&goal.id))
            .is_some()
    );
}

#[tokio::test]
async fn periodic_sync_runs_until_stopped() {
    let fx = Fixture::new();
    let services = Arc::new(fx.services(Some(alice()), fx.deps()));
    services
        .create_goal(Companion::Sage, "plan the week", 30, None)
        .expect("goal");

    let periodic = services.spawn_periodic_sync_every(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(80)).await;
    periodic.stop().await;

    assert_eq!(services.goals().pending_len(), 0);
    let contacted = fx.remote.call_count();
    assert!(contacted > 0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fx.remote.call_count(), contacted);
}

#[tokio::test]
async fn dropping_the_periodic_handle_lets_the_pass_finish_then_stops() {
    let fx = Fixture::new();
    let services = Arc::new(fx.services(Some(alice()), fx.deps()));
    services
        .create_goal(Companion::Sage, "tidy the desk", 30, None)
        .expect("goal");

    let periodic = services.spawn_periodic_sync_every(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(40)).await;
    drop(periodic);
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(services.goals().pending_len(), 0);
    let contacted = fx.remote.call_count();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(fx.remote.call_count(), contacted);
}

#[tokio::test]
async fn message_events_count_toward_social_achievements() {
    let fx = Fixture::new();
    let services = fx.services(Some(alice()), fx.deps());
    services
        .send_chat_message(Companion::Spark, "morning!")
        .await
        .expect("reply");

    // MessageSent is only published once the message reaches the remote store.
    assert!(services.achievements().find("first_hello").is_none());

    let report = services.sync_all(true).await.expect("sync");
    assert!(
        report
            .chat
            .events
            .iter()
            .any(|event| matches!(event, DomainEvent::MessageSent { .. }))
    );
    assert!(
        services
            .achievements()
            .find("first_hello")
            .is_some_and(|progress| progress.is_unlocked())
    );
    assert_eq!(
        services.stats().find("spark").map(|p| p.messages_sent),
        Some(1)
    );
}
