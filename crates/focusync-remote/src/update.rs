//! Field-level writes and collection queries.

use crate::Document;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// One field-level write applied by [`crate::RemoteStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrite a field.
    Set { field: String, value: Value },
    /// Add to a numeric field atomically; a missing field counts as zero.
    Increment { field: String, by: i64 },
    /// Append values to an array field, skipping ones already present.
    ArrayUnion { field: String, values: Vec<Value> },
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn increment(field: impl Into<String>, by: i64) -> Self {
        FieldUpdate::Increment {
            field: field.into(),
            by,
        }
    }

    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> Self {
        FieldUpdate::ArrayUnion {
            field: field.into(),
            values,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldUpdate::Set { field, .. }
            | FieldUpdate::Increment { field, .. }
            | FieldUpdate::ArrayUnion { field, .. } => field,
        }
    }
}

/// Apply updates to a document body the way the hosted store does.
///
/// Non-object documents are replaced by an empty object first.
pub fn apply_updates(document: &mut Value, updates: &[FieldUpdate]) {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    let Value::Object(map) = document else {
        return;
    };
    for update in updates {
        match update {
            FieldUpdate::Set { field, value } => {
                map.insert(field.clone(), value.clone());
            }
            FieldUpdate::Increment { field, by } => {
                let next = match map.get(field) {
                    Some(Value::Number(current)) if current.is_f64() => {
                        Value::from(current.as_f64().unwrap_or_default() + *by as f64)
                    }
                    Some(Value::Number(current)) => {
                        Value::from(current.as_i64().unwrap_or_default().saturating_add(*by))
                    }
                    _ => Value::from(*by),
                };
                map.insert(field.clone(), next);
            }
            FieldUpdate::ArrayUnion { field, values } => {
                let entry = map
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry {
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Collection query: equality filters, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document body passes every equality filter.
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }

    /// Filter, order and truncate an unordered document set.
    pub fn evaluate(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.data))
            .collect();
        if let Some((field, direction)) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.data.get(field), b.data.get(field));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Order field values; timestamps compare chronologically, missing sorts first.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (
                a.parse::<DateTime<Utc>>(),
                b.parse::<DateTime<Utc>>(),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocPath;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn increments_accumulate_and_create_missing_fields() {
        let mut doc = json!({ "current_minutes": 8, "title": "read" });
        apply_updates(
            &mut doc,
            &[
                FieldUpdate::increment("current_minutes", 5),
                FieldUpdate::increment("current_minutes", 10),
                FieldUpdate::increment("sessions", 1),
            ],
        );
        assert_eq!(
            doc,
            json!({ "current_minutes": 23, "title": "read", "sessions": 1 })
        );
    }

    #[test]
    fn array_union_skips_present_values() {
        let mut doc = Value::Null;
        apply_updates(
            &mut doc,
            &[
                FieldUpdate::array_union("tags", vec![json!("a"), json!("b")]),
                FieldUpdate::array_union("tags", vec![json!("b"), json!("c")]),
            ],
        );
        assert_eq!(doc, json!({ "tags": ["a", "b", "c"] }));
    }

    #[test]
    fn query_orders_timestamps_chronologically() {
        let docs = vec![
            Document {
                path: DocPath::parse("c/a"),
                data: json!({ "created_at": "2026-03-01T08:00:00Z", "kind": "x" }),
            },
            Document {
                path: DocPath::parse("c/b"),
                data: json!({ "created_at": "2026-03-01T08:00:00.500Z", "kind": "x" }),
            },
            Document {
                path: DocPath::parse("c/c"),
                data: json!({ "created_at": "2026-03-01T07:00:00Z", "kind": "y" }),
            },
        ];
        let query = Query::new()
            .where_eq("kind", "x")
            .order_by("created_at", SortDirection::Descending)
            .limit(5);
        let ids: Vec<_> = query
            .evaluate(docs)
            .iter()
            .map(|doc| doc.path.id().to_string())
            .collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }
}
