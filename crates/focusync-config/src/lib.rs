//! Settings for focusync: per-domain sync cadence, snapshot storage, the
//! companion chat model and timer lengths.
//!
//! Settings come from JSON5 files stacked by [`FocusyncConfig::load_layered`];
//! every layer is shape-checked before it is merged.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
