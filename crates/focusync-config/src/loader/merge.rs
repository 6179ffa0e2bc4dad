//! JSON merge helpers for layered configuration.

use serde_json::{Map, Value};

/// Overlay `overlay` onto `base`; objects merge key by key, anything else replaces.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    if let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay) {
        for (key, value) in overlay_map {
            match base_map.get_mut(key) {
                Some(existing) => merge_json_values(existing, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *base = overlay.clone();
}

/// Overlay `overlay` onto `base` without touching keys locked by `managed`.
///
/// A managed leaf locks that key; a managed object only locks the leaves it
/// names.
pub(super) fn merge_json_with_constraints(
    base: &mut Value,
    overlay: &Value,
    managed: Option<&Value>,
) {
    let Some(managed) = managed else {
        merge_json_values(base, overlay);
        return;
    };
    let Value::Object(managed_map) = managed else {
        return;
    };
    let Value::Object(overlay_map) = overlay else {
        return;
    };
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    let Value::Object(base_map) = base else {
        return;
    };
    for (key, value) in overlay_map {
        match managed_map.get(key) {
            None => match base_map.get_mut(key) {
                Some(existing) => merge_json_values(existing, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            },
            Some(locked) if locked.is_object() => {
                let entry = base_map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                merge_json_with_constraints(entry, value, Some(locked));
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_json_values, merge_json_with_constraints};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn overlay_merges_nested_objects() {
        let mut base = json!({ "sync": { "chat": { "cooldown_secs": 60 } }, "timer": {} });
        merge_json_values(
            &mut base,
            &json!({ "sync": { "goals": { "cooldown_secs": 10 } } }),
        );
        assert_eq!(
            base,
            json!({
                "sync": { "chat": { "cooldown_secs": 60 }, "goals": { "cooldown_secs": 10 } },
                "timer": {}
            })
        );
    }

    #[test]
    fn managed_leaves_are_not_overridden() {
        let managed = json!({ "chat": { "model": "locked" } });
        let mut base = managed.clone();
        merge_json_with_constraints(
            &mut base,
            &json!({ "chat": { "model": "other", "temperature": 0.2 } }),
            Some(&managed),
        );
        assert_eq!(
            base,
            json!({ "chat": { "model": "locked", "temperature": 0.2 } })
        );
    }
}
