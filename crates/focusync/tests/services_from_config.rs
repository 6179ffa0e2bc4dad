use focusync::config::{FocusyncConfig, StorageConfig};
use focusync::protocol::{Companion, OwnerId};
use focusync::remote::paths;
use focusync::services_from_config;
use focusync_test_utils::InMemoryRemote;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn config_with_storage(dir: &TempDir) -> FocusyncConfig {
    FocusyncConfig::builder()
        .storage(StorageConfig {
            enabled: true,
            path: Some(dir.path().display().to_string()),
        })
        .build()
}

#[tokio::test]
async fn services_persist_snapshots_under_configured_path() {
    focusync::init_logging();
    let dir = TempDir::new().expect("tmp");
    let config = config_with_storage(&dir);
    let remote = Arc::new(InMemoryRemote::new());
    let owner = OwnerId::new("alice");

    let services = services_from_config(&config, remote.clone(), Some(owner.clone()), None)
        .expect("services");
    let reply = services
        .send_chat_message(Companion::Sage, "hello")
        .await
        .expect("reply");
    assert!(reply.is_fallback());
    assert!(dir.path().join("chat.json").exists());

    let reopened =
        services_from_config(&config, remote.clone(), Some(owner.clone()), None).expect("services");
    assert_eq!(reopened.chat_history(Companion::Sage).len(), 2);

    reopened.sync_all(false).await.expect("sync");
    assert_eq!(
        remote
            .documents_in(&paths::messages(&owner, Companion::Sage))
            .len(),
        2
    );
}

#[tokio::test]
async fn disabled_storage_keeps_state_in_memory_only() {
    let dir = TempDir::new().expect("tmp");
    let mut config = config_with_storage(&dir);
    config.storage.enabled = false;
    let remote = Arc::new(InMemoryRemote::new());
    let owner = OwnerId::new("alice");

    let services =
        services_from_config(&config, remote.clone(), Some(owner.clone()), None).expect("services");
    services
        .create_goal(Companion::Ember, "stretch", 10, None)
        .expect("goal");
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);

    let reopened = services_from_config(&config, remote, Some(owner), None).expect("services");
    assert!(reopened.goals().records().is_empty());
}
