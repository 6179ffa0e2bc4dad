//! In-memory keyed collections of records, ordered chronologically.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// A record the local cache can hold.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity used for coalescing and merge.
    fn id(&self) -> &str;
    /// Collection key the record is grouped under.
    fn collection(&self) -> String;
    /// Timestamp used for chronological ordering.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Map from collection key to the records of that collection.
///
/// Every collection is kept sorted by [`Entity::timestamp`] with no duplicate
/// identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCache<R> {
    collections: BTreeMap<String, Vec<R>>,
}

impl<R> Default for LocalCache<R> {
    fn default() -> Self {
        Self {
            collections: BTreeMap::new(),
        }
    }
}

impl<R: Entity> LocalCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one collection; empty if the key is unknown.
    pub fn read(&self, key: &str) -> &[R] {
        self.collections
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace a collection, coalescing duplicates (last write wins).
    pub fn write(&mut self, key: impl Into<String>, records: Vec<R>) {
        let key = key.into();
        let records = coalesce(records);
        if records.is_empty() {
            self.collections.remove(&key);
        } else {
            self.collections.insert(key, records);
        }
    }

    /// Replace the whole cache, grouping records by their collection key.
    pub fn replace_all(&mut self, records: Vec<R>) {
        let mut grouped: BTreeMap<String, Vec<R>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.collection()).or_default().push(record);
        }
        self.collections.clear();
        for (key, records) in grouped {
            self.write(key, records);
        }
    }

    /// Insert or replace one record, returning the previous version.
    ///
    /// The previous version is removed from whichever collection held it, so
    /// a record whose collection key changed is not kept twice.
    pub fn upsert_one(&mut self, record: R) -> Option<R> {
        let previous = self
            .key_of(record.id())
            .and_then(|key| self.remove(&key, record.id()));
        let records = self.collections.entry(record.collection()).or_default();
        let index = records.partition_point(|existing| existing.timestamp() <= record.timestamp());
        records.insert(index, record);
        previous
    }

    /// Remove a record from a collection.
    pub fn remove(&mut self, key: &str, id: &str) -> Option<R> {
        let records = self.collections.get_mut(key)?;
        let index = records.iter().position(|record| record.id() == id)?;
        let removed = records.remove(index);
        if records.is_empty() {
            self.collections.remove(key);
        }
        Some(removed)
    }

    /// Find a record by identity across all collections.
    pub fn find(&self, id: &str) -> Option<&R> {
        self.collections
            .values()
            .flat_map(|records| records.iter())
            .find(|record| record.id() == id)
    }

    /// Modify a record in place, keeping its collection ordered. A record
    /// whose collection key changes moves to its new collection.
    pub fn update<T>(&mut self, id: &str, apply: impl FnOnce(&mut R) -> T) -> Option<T> {
        let key = self.key_of(id)?;
        let records = self.collections.get_mut(&key)?;
        let record = records.iter_mut().find(|record| record.id() == id)?;
        let result = apply(record);
        if record.collection() == key {
            records.sort_by_key(|record| record.timestamp());
        } else if let Some(moved) = self.remove(&key, id) {
            self.upsert_one(moved);
        }
        Some(result)
    }

    fn key_of(&self, id: &str) -> Option<String> {
        self.collections
            .iter()
            .find(|(_, records)| records.iter().any(|record| record.id() == id))
            .map(|(key, _)| key.clone())
    }

    /// Remove every record of a collection matching a predicate.
    pub fn retain(&mut self, key: &str, keep: impl FnMut(&R) -> bool) -> usize {
        let Some(records) = self.collections.get_mut(key) else {
            return 0;
        };
        let before = records.len();
        records.retain(keep);
        let removed = before - records.len();
        if records.is_empty() {
            self.collections.remove(key);
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// All records, grouped by collection key.
    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.collections.values().flat_map(|records| records.iter())
    }

    pub fn clear(&mut self) {
        self.collections.clear();
    }

    pub fn len(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Drop duplicate identities keeping the last occurrence, then sort.
fn coalesce<R: Entity>(records: Vec<R>) -> Vec<R> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<R> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(record.id()) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(record.id().to_string(), unique.len());
                unique.push(record);
            }
        }
    }
    unique.sort_by_key(|record| record.timestamp());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use focusync_protocol::{ChatMessage, Companion, Speaker};
    use pretty_assertions::assert_eq;

    fn message(id: &str, minute: u32, content: &str) -> ChatMessage {
        let mut message = ChatMessage::new(
            Companion::Sage,
            Speaker::User,
            content,
            Utc.with_ymd_and_hms(2026, 3, 1, 8, minute, 0)
                .single()
                .expect("time"),
        );
        message.id = id.to_string();
        message
    }

    fn ids(records: &[ChatMessage]) -> Vec<&str> {
        records.iter().map(|record| record.id.as_str()).collect()
    }

    #[test]
    fn write_coalesces_duplicates_and_sorts() {
        let mut cache = LocalCache::new();
        cache.write(
            "sage",
            vec![
                message("m2", 5, "second"),
                message("m1", 1, "first"),
                message("m2", 5, "second edited"),
            ],
        );
        let records = cache.read("sage");
        assert_eq!(ids(records), vec!["m1", "m2"]);
        assert_eq!(records[1].content, "second edited");
    }

    #[test]
    fn upsert_replaces_existing_identity() {
        let mut cache = LocalCache::new();
        cache.upsert_one(message("m1", 3, "hi"));
        cache.upsert_one(message("m0", 1, "earlier"));
        let previous = cache.upsert_one(message("m1", 3, "hello"));
        assert_eq!(previous.map(|m| m.content), Some("hi".to_string()));
        assert_eq!(ids(cache.read("sage")), vec!["m0", "m1"]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find("m1").map(|m| m.content.as_str()), Some("hello"));
    }

    #[test]
    fn removing_last_record_drops_the_key() {
        let mut cache = LocalCache::new();
        cache.upsert_one(message("m1", 1, "hi"));
        assert!(cache.remove("sage", "m1").is_some());
        assert!(cache.is_empty());
        assert_eq!(cache.keys().count(), 0);
        assert!(cache.read("sage").is_empty());
    }

    #[test]
    fn upsert_moves_a_record_whose_collection_changed() {
        let mut cache = LocalCache::new();
        cache.upsert_one(message("m1", 1, "hi"));
        let mut moved = message("m1", 1, "hi again");
        moved.companion = Companion::Ember;
        let previous = cache.upsert_one(moved);

        assert_eq!(previous.map(|m| m.companion), Some(Companion::Sage));
        assert_eq!(cache.len(), 1);
        assert!(cache.read("sage").is_empty());
        assert_eq!(ids(cache.read("ember")), vec!["m1"]);
    }

    #[test]
    fn update_regroups_when_the_collection_key_changes() {
        let mut cache = LocalCache::new();
        cache.upsert_one(message("m1", 1, "hi"));
        cache.upsert_one(message("m2", 2, "there"));
        cache.update("m1", |message| message.companion = Companion::Tide);

        assert_eq!(ids(cache.read("sage")), vec!["m2"]);
        assert_eq!(ids(cache.read("tide")), vec!["m1"]);
        assert_eq!(cache.len(), 2);
    }
}
