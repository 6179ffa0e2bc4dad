//! FIFO of optimistic mutations not yet confirmed by the remote store.

use chrono::{DateTime, Utc};
use focusync_protocol::new_record_id;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A queued mutation with its enqueue metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation<M> {
    /// Monotonic sequence number within the queue.
    pub seq: u64,
    /// Stable identity written next to the remote effect, so a replay can
    /// tell whether an earlier attempt already landed.
    #[serde(default = "new_record_id")]
    pub id: String,
    pub enqueued_at: DateTime<Utc>,
    pub mutation: M,
}

/// Ordered pending mutations. Entries are never merged, so two increments of
/// the same record replay as two remote increments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQueue<M> {
    next_seq: u64,
    entries: VecDeque<PendingMutation<M>>,
}

impl<M> Default for PendingQueue<M> {
    fn default() -> Self {
        Self {
            next_seq: 1,
            entries: VecDeque::new(),
        }
    }
}

impl<M: Clone> PendingQueue<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation; never rejects.
    pub fn enqueue(&mut self, mutation: M, now: DateTime<Utc>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(PendingMutation {
            seq,
            id: new_record_id(),
            enqueued_at: now,
            mutation,
        });
        seq
    }

    /// Take every entry, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<PendingMutation<M>> {
        self.entries.drain(..).collect()
    }

    pub fn front(&self) -> Option<&PendingMutation<M>> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<PendingMutation<M>> {
        self.entries.pop_front()
    }

    /// Drop the head entry if it is the one with `seq`.
    pub fn confirm(&mut self, seq: u64) -> bool {
        if self.entries.front().is_some_and(|entry| entry.seq == seq) {
            self.entries.pop_front();
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation<M>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entries_keep_fifo_order_and_increasing_seq() {
        let now = Utc::now();
        let mut queue = PendingQueue::new();
        let first = queue.enqueue("inc 5", now);
        let second = queue.enqueue("inc 10", now);
        assert!(second > first);
        assert_eq!(queue.front().map(|entry| entry.mutation), Some("inc 5"));

        assert!(!queue.confirm(second));
        assert!(queue.confirm(first));
        let rest: Vec<_> = queue.drain().into_iter().map(|e| e.mutation).collect();
        assert_eq!(rest, vec!["inc 10"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn sequence_survives_serialization() {
        let now = Utc::now();
        let mut queue = PendingQueue::new();
        queue.enqueue(1u32, now);
        queue.pop_front();
        let restored: PendingQueue<u32> =
            serde_json::from_value(serde_json::to_value(&queue).expect("serialize"))
                .expect("deserialize");
        let mut restored = restored;
        assert_eq!(restored.enqueue(2, now), 2);
    }

    #[test]
    fn entry_ids_are_distinct_and_persist() {
        let now = Utc::now();
        let mut queue = PendingQueue::new();
        queue.enqueue("a", now);
        queue.enqueue("b", now);
        let ids: Vec<String> = queue.iter().map(|entry| entry.id.clone()).collect();
        assert_ne!(ids[0], ids[1]);

        let restored: PendingQueue<String> =
            serde_json::from_value(serde_json::to_value(&queue).expect("serialize"))
                .expect("deserialize");
        let restored_ids: Vec<String> = restored.iter().map(|entry| entry.id.clone()).collect();
        assert_eq!(restored_ids, ids);
    }
}
