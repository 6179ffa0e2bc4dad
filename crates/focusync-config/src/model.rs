//! Configuration schema for focusync.

use serde::{Deserialize, Serialize};

/// Root config shared by the sync stores, chat client and timer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FocusyncConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

impl FocusyncConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> FocusyncConfigBuilder {
        FocusyncConfigBuilder::new()
    }
}

/// Builder for assembling a `FocusyncConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct FocusyncConfigBuilder {
    config: FocusyncConfig,
}

impl FocusyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FocusyncConfig::default(),
        }
    }

    /// Replace the sync cadence configuration.
    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    /// Replace the local snapshot storage configuration.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Replace the companion chat configuration.
    pub fn chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    /// Replace the focus timer configuration.
    pub fn timer(mut self, timer: TimerConfig) -> Self {
        self.config.timer = timer;
        self
    }

    pub fn build(self) -> FocusyncConfig {
        self.config
    }
}

/// Per-domain sync cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_chat_sync")]
    pub chat: DomainSyncConfig,
    #[serde(default = "default_goals_sync")]
    pub goals: DomainSyncConfig,
    #[serde(default = "default_stats_sync")]
    pub stats: DomainSyncConfig,
    #[serde(default = "default_achievements_sync")]
    pub achievements: DomainSyncConfig,
    /// Interval of the background sync loop.
    #[serde(default = "default_periodic_interval_secs")]
    pub periodic_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_sync(),
            goals: default_goals_sync(),
            stats: default_stats_sync(),
            achievements: default_achievements_sync(),
            periodic_interval_secs: default_periodic_interval_secs(),
        }
    }
}

/// Sync settings for a single domain store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainSyncConfig {
    /// Minimum seconds between unforced remote contacts.
    pub cooldown_secs: u64,
    /// Pull fresh remote state after replaying pending mutations.
    #[serde(default = "default_true")]
    pub pull_on_sync: bool,
}

impl DomainSyncConfig {
    pub fn with_cooldown(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs,
            pull_on_sync: true,
        }
    }
}

fn default_chat_sync() -> DomainSyncConfig {
    DomainSyncConfig::with_cooldown(60)
}

fn default_goals_sync() -> DomainSyncConfig {
    DomainSyncConfig::with_cooldown(120)
}

fn default_stats_sync() -> DomainSyncConfig {
    DomainSyncConfig::with_cooldown(180)
}

fn default_achievements_sync() -> DomainSyncConfig {
    DomainSyncConfig::with_cooldown(300)
}

fn default_periodic_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Local snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Snapshot directory; defaults to `~/.focusync/state`.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Companion chat completion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Most recent messages sent as history.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    /// Estimated token budget for history.
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: usize,
    /// Characters per token used by the estimate.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    /// Messages fetched per companion on a chat pull.
    #[serde(default = "default_pull_limit")]
    pub pull_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_history_messages: default_max_history_messages(),
            max_history_tokens: default_max_history_tokens(),
            chars_per_token: default_chars_per_token(),
            pull_limit: default_pull_limit(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    300
}

fn default_max_history_messages() -> usize {
    20
}

fn default_max_history_tokens() -> usize {
    2000
}

fn default_chars_per_token() -> usize {
    4
}

fn default_pull_limit() -> usize {
    50
}

/// Focus timer intervals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerConfig {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_sessions_before_long_break")]
    pub sessions_before_long_break: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            sessions_before_long_break: default_sessions_before_long_break(),
        }
    }
}

fn default_focus_minutes() -> u32 {
    25
}

fn default_short_break_minutes() -> u32 {
    5
}

fn default_long_break_minutes() -> u32 {
    15
}

fn default_sessions_before_long_break() -> u32 {
    4
}
