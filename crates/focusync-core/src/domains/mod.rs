//! Domain adapters plugged into the generic sync engine.

pub mod achievements;
pub mod chat;
pub mod goals;
pub mod stats;

pub use achievements::{AchievementDef, AchievementMutation, AchievementsAdapter, catalog};
pub use chat::{ChatAdapter, ChatMutation};
pub use goals::{GoalEdit, GoalMutation, GoalsAdapter};
pub use stats::{StatsAdapter, StatsMutation};

use crate::cache::Entity;
use chrono::{DateTime, SecondsFormat, Utc};
use focusync_protocol::RecordId;
use focusync_remote::{DocPath, Document, FieldUpdate, RemoteError, RemoteStore, decode_document};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(record)
        .map_err(|err| RemoteError::Rejected(format!("failed to encode record: {err}")))
}

/// Timestamp in the same textual form serde writes for records.
pub(crate) fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Array field listing the queued mutations whose writes a document carries.
const APPLIED_FIELD: &str = "applied";

/// Marker write that goes out with a mutation's remote effect.
pub(crate) fn applied_mark(mutation_id: &str) -> FieldUpdate {
    FieldUpdate::array_union(APPLIED_FIELD, vec![Value::from(mutation_id)])
}

/// A remote document read before replaying a mutation against it.
pub(crate) struct Fetched<T> {
    pub record: Option<T>,
    data: Value,
}

impl<T> Fetched<T> {
    /// Whether an earlier attempt of this mutation already landed.
    pub fn applied(&self, mutation_id: &str) -> bool {
        self.data
            .get(APPLIED_FIELD)
            .and_then(Value::as_array)
            .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(mutation_id)))
    }

    /// Whether `field` names this mutation as the one that caused a transition.
    pub fn caused_by(&self, field: &str, mutation_id: &str) -> bool {
        self.data.get(field).and_then(Value::as_str) == Some(mutation_id)
    }
}

pub(crate) async fn fetch<T: DeserializeOwned>(
    remote: &dyn RemoteStore,
    path: &DocPath,
) -> Result<Fetched<T>, RemoteError> {
    let data = remote.get(path).await?.unwrap_or(Value::Null);
    let record = if data.is_null() {
        None
    } else {
        decode_document(path, data.clone())
    };
    Ok(Fetched { record, data })
}

pub(crate) fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents.iter().filter_map(|document| document.decode()).collect()
}

/// Identity-keyed merge shared by the adapters.
///
/// Unconfirmed identities keep the local version, including its absence: a
/// record removed locally is not brought back by a pull. Records present on
/// both sides go through `reconcile(local, remote)`. Local-only records survive
/// when `keep_local_only` is set.
pub(crate) fn merge_by_identity<R: Entity>(
    local: Vec<R>,
    remote: Vec<R>,
    unconfirmed: &HashSet<RecordId>,
    keep_local_only: bool,
    reconcile: impl Fn(R, R) -> R,
) -> Vec<R> {
    let mut local_by_id: HashMap<String, R> = HashMap::with_capacity(local.len());
    let mut local_order = Vec::with_capacity(local.len());
    for record in local {
        local_order.push(record.id().to_string());
        local_by_id.insert(record.id().to_string(), record);
    }

    let mut merged = Vec::with_capacity(remote.len() + local_by_id.len());
    let mut seen = HashSet::new();
    for remote_record in remote {
        let id = remote_record.id().to_string();
        if !seen.insert(id.clone()) {
            continue;
        }
        let pending = unconfirmed.contains(&id);
        let record = match local_by_id.remove(&id) {
            Some(local_record) if pending => local_record,
            Some(local_record) => reconcile(local_record, remote_record),
            None if pending => continue,
            None => remote_record,
        };
        merged.push(record);
    }
    for id in local_order {
        let Some(record) = local_by_id.remove(&id) else {
            continue;
        };
        if keep_local_only || unconfirmed.contains(&id) {
            merged.push(record);
        }
    }
    merged
}
