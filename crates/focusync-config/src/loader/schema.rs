//! Shape checks run on every layer before merging.
//!
//! Each section lists its keys and the JSON kind they must hold; a nested
//! section recurses with a dotted path so errors point at the offending key.

use crate::ConfigError;
use serde_json::{Map, Value};

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Flag,
    Count,
    Number,
    Section(&'static [Field]),
}

type Field = (&'static str, Kind);

const DOMAIN_SYNC: &[Field] = &[
    ("cooldown_secs", Kind::Count),
    ("pull_on_sync", Kind::Flag),
];

const SYNC: &[Field] = &[
    ("chat", Kind::Section(DOMAIN_SYNC)),
    ("goals", Kind::Section(DOMAIN_SYNC)),
    ("stats", Kind::Section(DOMAIN_SYNC)),
    ("achievements", Kind::Section(DOMAIN_SYNC)),
    ("periodic_interval_secs", Kind::Count),
];

const STORAGE: &[Field] = &[("enabled", Kind::Flag), ("path", Kind::Text)];

const CHAT: &[Field] = &[
    ("model", Kind::Text),
    ("temperature", Kind::Number),
    ("max_tokens", Kind::Count),
    ("max_history_messages", Kind::Count),
    ("max_history_tokens", Kind::Count),
    ("chars_per_token", Kind::Count),
    ("pull_limit", Kind::Count),
];

const TIMER: &[Field] = &[
    ("focus_minutes", Kind::Count),
    ("short_break_minutes", Kind::Count),
    ("long_break_minutes", Kind::Count),
    ("sessions_before_long_break", Kind::Count),
];

const ROOT: &[Field] = &[
    ("$schema", Kind::Text),
    ("sync", Kind::Section(SYNC)),
    ("storage", Kind::Section(STORAGE)),
    ("chat", Kind::Section(CHAT)),
    ("timer", Kind::Section(TIMER)),
];

/// Check a layer (or the merged document) for unknown keys and wrong types.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    check(value, Kind::Section(ROOT), layer, "")
}

fn check(value: &Value, kind: Kind, layer: &str, path: &str) -> Result<(), ConfigError> {
    let ok = match kind {
        Kind::Text => value.is_string(),
        Kind::Flag => value.is_boolean(),
        // Durations and counts are never negative.
        Kind::Count => value.is_u64(),
        Kind::Number => value.is_number(),
        Kind::Section(fields) => {
            let Value::Object(map) = value else {
                return Err(field_error(layer, path, "expected object"));
            };
            return check_section(map, fields, layer, path);
        }
    };
    if ok {
        return Ok(());
    }
    let expected = match kind {
        Kind::Text => "expected string",
        Kind::Flag => "expected bool",
        Kind::Count => "expected non-negative integer",
        Kind::Number | Kind::Section(_) => "expected number",
    };
    Err(field_error(layer, path, expected))
}

fn check_section(
    map: &Map<String, Value>,
    fields: &[Field],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for (key, value) in map {
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        let Some((_, kind)) = fields.iter().find(|(name, _)| *name == key.as_str()) else {
            return Err(field_error(layer, &child, "unknown key"));
        };
        check(value, *kind, layer, &child)?;
    }
    Ok(())
}

fn field_error(layer: &str, path: &str, message: &str) -> ConfigError {
    let at = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{at}"),
        message: message.to_string(),
    }
}
