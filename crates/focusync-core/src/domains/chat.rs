//! Companion chat history, one message subcollection per companion.

use super::{decode_all, encode, merge_by_identity};
use crate::cache::{Entity, LocalCache};
use crate::engine::DomainAdapter;
use crate::queue::PendingMutation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focusync_protocol::{ChatMessage, Companion, DomainEvent, OwnerId, RecordId, Speaker};
use focusync_remote::{Query, RemoteError, RemoteStore, SortDirection, paths};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of most recent messages pulled per companion.
pub const DEFAULT_PULL_LIMIT: usize = 50;

impl Entity for ChatMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection(&self) -> String {
        self.companion.as_str().to_string()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChatMutation {
    Append(ChatMessage),
    /// Delete every message with the companion created at or before `before`.
    ClearHistory {
        companion: Companion,
        before: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ChatAdapter {
    pull_limit: usize,
}

impl Default for ChatAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_PULL_LIMIT)
    }
}

impl ChatAdapter {
    pub fn new(pull_limit: usize) -> Self {
        Self {
            pull_limit: pull_limit.max(1),
        }
    }
}

#[async_trait]
impl DomainAdapter for ChatAdapter {
    type Record = ChatMessage;
    type Mutation = ChatMutation;

    const NAMESPACE: &'static str = "chat";

    fn apply_local(
        &self,
        cache: &mut LocalCache<ChatMessage>,
        mutation: &ChatMutation,
        _now: DateTime<Utc>,
    ) {
        match mutation {
            ChatMutation::Append(message) => {
                cache.upsert_one(message.clone());
            }
            ChatMutation::ClearHistory { companion, before } => {
                cache.retain(companion.as_str(), |message| message.created_at > *before);
            }
        }
    }

    fn touched_identity(&self, mutation: &ChatMutation) -> Option<RecordId> {
        match mutation {
            ChatMutation::Append(message) => Some(message.id.clone()),
            ChatMutation::ClearHistory { .. } => None,
        }
    }

    async fn replay(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
        entry: &PendingMutation<ChatMutation>,
    ) -> Result<Vec<DomainEvent>, RemoteError> {
        // Writes here are whole-document sets and deletes, so a repeated
        // replay lands on the same state.
        match &entry.mutation {
            ChatMutation::Append(message) => {
                let path = paths::messages(owner, message.companion).doc(&message.id);
                remote.set(&path, encode(message)?).await?;
                if message.speaker == Speaker::User {
                    return Ok(vec![DomainEvent::MessageSent {
                        companion: message.companion,
                        message_id: message.id.clone(),
                    }]);
                }
                Ok(Vec::new())
            }
            ChatMutation::ClearHistory { companion, before } => {
                let collection = paths::messages(owner, *companion);
                let documents = remote.query(&collection, &Query::new()).await?;
                let mut removed = 0usize;
                for document in &documents {
                    let Some(message) = document.decode::<ChatMessage>() else {
                        continue;
                    };
                    if message.created_at <= *before {
                        remote.delete(&document.path).await?;
                        removed += 1;
                    }
                }
                debug!(
                    "cleared remote chat history (companion={}, removed={})",
                    companion, removed
                );
                Ok(Vec::new())
            }
        }
    }

    async fn pull(
        &self,
        remote: &dyn RemoteStore,
        owner: &OwnerId,
    ) -> Result<Option<Vec<ChatMessage>>, RemoteError> {
        let mut messages = Vec::new();
        for companion in Companion::ALL {
            // Documents filed under the wrong companion do not count toward
            // this companion's page.
            let query = Query::new()
                .where_eq("companion", companion.as_str())
                .order_by("created_at", SortDirection::Descending)
                .limit(self.pull_limit);
            let documents = remote
                .query(&paths::messages(owner, companion), &query)
                .await?;
            messages.extend(decode_all::<ChatMessage>(&documents));
        }
        Ok(Some(messages))
    }

    /// Remote wins for known ids; local messages outside the pulled page stay.
    fn merge(
        &self,
        local: Vec<ChatMessage>,
        remote: Vec<ChatMessage>,
        unconfirmed: &HashSet<RecordId>,
    ) -> Vec<ChatMessage> {
        merge_by_identity(local, remote, unconfirmed, true, |_, remote| remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn message(id: &str, minute: u32, content: &str) -> ChatMessage {
        let mut message = ChatMessage::new(
            Companion::Spark,
            Speaker::User,
            content,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0)
                .single()
                .expect("time"),
        );
        message.id = id.to_string();
        message
    }

    #[test]
    fn unconfirmed_message_survives_a_pull_without_it_exactly_once() {
        let adapter = ChatAdapter::default();
        let local = vec![message("m0", 0, "old"), message("m1", 5, "pending")];
        let remote = vec![message("m0", 0, "old"), message("m2", 3, "from elsewhere")];
        let mut cache = LocalCache::new();
        cache.replace_all(adapter.merge(
            local,
            remote,
            &HashSet::from(["m1".to_string()]),
        ));

        let ids: Vec<_> = cache
            .read("spark")
            .iter()
            .map(|message| message.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m0", "m2", "m1"]);
    }

    #[test]
    fn clear_history_keeps_newer_messages() {
        let adapter = ChatAdapter::default();
        let mut cache = LocalCache::new();
        cache.upsert_one(message("m0", 0, "a"));
        cache.upsert_one(message("m1", 10, "b"));
        let before = message("x", 5, "").created_at;
        adapter.apply_local(
            &mut cache,
            &ChatMutation::ClearHistory {
                companion: Companion::Spark,
                before,
            },
            before,
        );
        assert_eq!(cache.len(), 1);
        assert!(cache.find("m1").is_some());
        let clear = ChatMutation::ClearHistory {
            companion: Companion::Spark,
            before,
        };
        assert_eq!(adapter.touched_identity(&clear), None);
    }
}
