//! Reading layers from disk and locating the default layer files.

use super::{ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, LoadedLayer, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Where layers live when the caller does not say otherwise.
pub(super) struct DefaultLocations {
    pub(super) system: Option<PathBuf>,
    pub(super) user: Option<PathBuf>,
    pub(super) managed: Option<PathBuf>,
}

impl DefaultLocations {
    pub(super) fn discover() -> Self {
        let etc = cfg!(unix).then(|| PathBuf::from("/etc").join("focusync"));
        Self {
            system: etc.as_ref().map(|dir| dir.join(DEFAULT_CONFIG_FILE)),
            managed: etc.map(|dir| dir.join("managed.json5")),
            user: UserDirs::new()
                .map(|dirs| dirs.home_dir().join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE)),
        }
    }
}

/// Read a layer that may legitimately be absent.
pub(super) fn read_if_present(
    source: ConfigLayerSource,
    path: Option<&Path>,
) -> Result<Option<LoadedLayer>, ConfigError> {
    match path {
        Some(path) if path.exists() => read_layer(source, path).map(Some),
        Some(path) => {
            debug!("no {} layer at {}", source.label(), path.display());
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Read, parse and shape-check one layer file.
pub(super) fn read_layer(source: ConfigLayerSource, path: &Path) -> Result<LoadedLayer, ConfigError> {
    let meta = ConfigLayer {
        source,
        path: path.to_path_buf(),
    };
    let label = meta.label();
    let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: meta.path.clone(),
        source: err,
    })?;
    let value = json5::from_str(&text).map_err(|err| ConfigError::Parse {
        label: label.clone(),
        source: err,
    })?;
    schema::validate_layer_schema(&value, &label)?;
    Ok(LoadedLayer { meta, value })
}

impl ConfigLayer {
    /// `source(path)`, used to prefix validation errors.
    pub fn label(&self) -> String {
        format!("{}({})", self.source.label(), self.path.display())
    }

    /// Identity used to load a file only once when two layers name it.
    pub(super) fn identity(&self) -> PathBuf {
        fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone())
    }
}
