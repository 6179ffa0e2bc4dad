//! Layered configuration loader.
//!
//! Layers are read in precedence order (system, user, working directory, then
//! runtime overrides), shape-checked one by one and deep-merged. An optional
//! managed layer pins the keys it sets so no other layer can change them.

mod layer_io;
mod merge;
mod schema;


use crate::{ConfigError, FocusyncConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory and the user config dir.
const DEFAULT_CONFIG_FILE: &str = "focusync.json5";
const DEFAULT_CONFIG_DIR: &str = ".focusync";

/// Merged config and the layers it was built from, lowest precedence first.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: FocusyncConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Which slot of the stack a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Pinned keys that override everything else.
    Managed,
    System,
    User,
    Cwd,
    /// Explicit override files, applied last.
    Runtime,
}

impl ConfigLayerSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::System => "system",
            Self::User => "user",
            Self::Cwd => "cwd",
            Self::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Explicit layer locations. `None` skips that layer.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    pub system_config_path: Option<PathBuf>,
    pub user_config_path: Option<PathBuf>,
    pub managed_config_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Default locations: `/etc/focusync` on Unix and `~/.focusync`.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        let defaults = layer_io::DefaultLocations::discover();
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: defaults.system,
            user_config_path: defaults.user,
            managed_config_path: defaults.managed,
            runtime_paths: Vec::new(),
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

/// Accumulates layers in precedence order, skipping files already seen.
#[derive(Default)]
struct LayerStack {
    managed: Option<Value>,
    values: Vec<Value>,
    layers: Vec<ConfigLayer>,
    seen: HashSet<PathBuf>,
}

impl LayerStack {
    fn set_managed(&mut self, layer: LoadedLayer) {
        self.seen.insert(layer.meta.identity());
        self.layers.push(layer.meta);
        self.managed = Some(layer.value);
    }

    fn push(&mut self, layer: LoadedLayer, dedupe: bool) {
        if dedupe && !self.seen.insert(layer.meta.identity()) {
            debug!("layer already loaded, skipping {}", layer.meta.label());
            return;
        }
        debug!("loaded layer {}", layer.meta.label());
        self.layers.push(layer.meta);
        self.values.push(layer.value);
    }

    fn merge(&self) -> Value {
        let mut merged = Value::Object(serde_json::Map::new());
        if let Some(managed) = &self.managed {
            merge::merge_json_values(&mut merged, managed);
        }
        for value in &self.values {
            merge::merge_json_with_constraints(&mut merged, value, self.managed.as_ref());
        }
        merged
    }
}

impl FocusyncConfig {
    /// Read one file with no layering.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!("config read from {}", path.display());
        Self::load_from_str(&text)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        let value = json5::from_str(contents).map_err(|source| ConfigError::Parse {
            label: "config".to_string(),
            source,
        })?;
        finish(value)
    }

    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut stack = LayerStack::default();
        if let Some(layer) = layer_io::read_if_present(
            ConfigLayerSource::Managed,
            options.managed_config_path.as_deref(),
        )? {
            stack.set_managed(layer);
        }

        let local = options.cwd.join(DEFAULT_CONFIG_FILE);
        let discovered = [
            (ConfigLayerSource::System, options.system_config_path.as_deref()),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
            (ConfigLayerSource::Cwd, Some(local.as_path())),
        ];
        for (source, path) in discovered {
            if let Some(layer) = layer_io::read_if_present(source, path)? {
                stack.push(layer, true);
            }
        }
        for path in &options.runtime_paths {
            stack.push(layer_io::read_layer(ConfigLayerSource::Runtime, path)?, false);
        }

        let config = finish(stack.merge())?;
        info!("config loaded (layers={})", stack.layers.len());
        Ok(LayeredConfig {
            config,
            layers: stack.layers,
        })
    }

    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("chat.chars_per_token", self.chat.chars_per_token as u64),
            ("chat.max_history_messages", self.chat.max_history_messages as u64),
            ("timer.focus_minutes", self.timer.focus_minutes as u64),
            (
                "timer.sessions_before_long_break",
                self.timer.sessions_before_long_break as u64,
            ),
            ("sync.periodic_interval_secs", self.sync.periodic_interval_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!(
                "{key} must be greater than zero"
            )));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::Invalid(
                "chat.temperature must be within 0.0..=2.0".to_string(),
            ));
        }
        Ok(())
    }
}

fn finish(value: Value) -> Result<FocusyncConfig, ConfigError> {
    schema::validate_layer_schema(&value, "effective")?;
    let config: FocusyncConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
