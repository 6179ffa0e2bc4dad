//! Public surface for focusync.
//!
//! Re-exports the building blocks and wires configuration, snapshot storage
//! and the companion model into a ready [`FocusServices`](core::FocusServices).

/// Re-export for convenience.
pub use focusync_config as config;
pub use focusync_core as core;
/// Re-export for convenience.
pub use focusync_protocol as protocol;
/// Re-export for convenience.
pub use focusync_remote as remote;

use anyhow::Context;
use focusync_config::FocusyncConfig;
use focusync_core::{FocusServices, ServiceDeps, build_openai_provider, open_snapshot_store};
use focusync_protocol::OwnerId;
use focusync_remote::RemoteStore;
use log::{info, warn};
use std::sync::Arc;

/// Environment variable holding the companion model API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}

/// Build services from an already loaded config.
///
/// The companion model is enabled when `api_key` is given; otherwise replies
/// fall back to canned persona lines.
pub fn services_from_config(
    config: &FocusyncConfig,
    remote: Arc<dyn RemoteStore>,
    owner: Option<OwnerId>,
    api_key: Option<&str>,
) -> anyhow::Result<FocusServices> {
    let mut deps = ServiceDeps::new(remote);
    if let Some(snapshots) =
        open_snapshot_store(&config.storage).context("failed to open snapshot store")?
    {
        deps = deps.with_snapshots(snapshots);
    }
    match api_key {
        Some(key) => {
            let llm = build_openai_provider(&config.chat, key)
                .context("failed to build companion chat provider")?;
            deps = deps.with_llm(llm);
        }
        None => warn!("no companion model configured; chat replies use fallback lines"),
    }
    Ok(FocusServices::new(config, owner, deps))
}

/// Load layered config from the working directory and build services, reading
/// the model key from the environment.
pub fn open_services(
    remote: Arc<dyn RemoteStore>,
    owner: Option<OwnerId>,
) -> anyhow::Result<FocusServices> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let layered = FocusyncConfig::load_layered(&cwd).context("failed to load focusync config")?;
    for layer in &layered.layers {
        info!(
            "loaded config layer (source={}, path={})",
            layer.source.label(),
            layer.path.display()
        );
    }
    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty());
    services_from_config(&layered.config, remote, owner, api_key.as_deref())
}
