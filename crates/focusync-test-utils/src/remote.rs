use async_trait::async_trait;
use focusync_remote::{
    CollectionPath, DocPath, Document, FieldUpdate, Query, RemoteError, RemoteStore, apply_updates,
};
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Get,
    Set,
    Update,
    Delete,
    Query,
}

impl RemoteOp {
    pub fn is_write(&self) -> bool {
        matches!(self, RemoteOp::Set | RemoteOp::Update | RemoteOp::Delete)
    }
}

/// One call made against the fake, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub path: String,
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    /// Successful writes allowed before every write fails.
    writes_before_failure: Option<usize>,
    failing_paths: Vec<String>,
    /// Writes still to be applied and then reported as failed.
    lost_acks: usize,
}

/// Document store held in memory, with call recording and failure injection.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    documents: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<RemoteCall>>,
    faults: Mutex<Faults>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document without recording a call.
    pub fn seed(&self, path: &DocPath, data: Value) {
        self.documents.lock().insert(path.as_str().to_string(), data);
    }

    pub fn document(&self, path: &DocPath) -> Option<Value> {
        self.documents.lock().get(path.as_str()).cloned()
    }

    /// Documents directly under a collection.
    pub fn documents_in(&self, collection: &CollectionPath) -> Vec<Value> {
        self.documents
            .lock()
            .iter()
            .filter(|(path, _)| DocPath::parse(path.as_str()).collection() == *collection)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn write_count(&self) -> usize {
        self.calls.lock().iter().filter(|call| call.op.is_write()).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail every call with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// Let `count` more writes succeed, then fail all writes.
    pub fn fail_writes_after(&self, count: usize) {
        self.faults.lock().writes_before_failure = Some(count);
    }

    /// Fail any call whose path contains `fragment`.
    pub fn fail_paths_containing(&self, fragment: impl Into<String>) {
        self.faults.lock().failing_paths.push(fragment.into());
    }

    /// Apply the next `count` writes but report each as failed, as when the
    /// response is lost after the store committed the write.
    pub fn lose_write_acks(&self, count: usize) {
        self.faults.lock().lost_acks = count;
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn begin(&self, op: RemoteOp, path: &str) -> Result<(), RemoteError> {
        self.calls.lock().push(RemoteCall {
            op,
            path: path.to_string(),
        });
        let mut faults = self.faults.lock();
        if faults.offline {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        if faults
            .failing_paths
            .iter()
            .any(|fragment| path.contains(fragment.as_str()))
        {
            return Err(RemoteError::Unavailable(format!("injected failure at {path}")));
        }
        if op.is_write() {
            if let Some(remaining) = faults.writes_before_failure.as_mut() {
                if *remaining == 0 {
                    return Err(RemoteError::Unavailable("injected write failure".to_string()));
                }
                *remaining -= 1;
            }
        }
        debug!("fake remote call (op={op:?}, path={path})");
        Ok(())
    }

    /// Outcome reported after a write has been applied.
    fn acknowledge(&self, path: &str) -> Result<(), RemoteError> {
        let mut faults = self.faults.lock();
        if faults.lost_acks == 0 {
            return Ok(());
        }
        faults.lost_acks -= 1;
        Err(RemoteError::Unavailable(format!(
            "response lost after write at {path}"
        )))
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, RemoteError> {
        self.begin(RemoteOp::Get, path.as_str())?;
        Ok(self.document(path))
    }

    async fn set(&self, path: &DocPath, data: Value) -> Result<(), RemoteError> {
        self.begin(RemoteOp::Set, path.as_str())?;
        self.documents.lock().insert(path.as_str().to_string(), data);
        self.acknowledge(path.as_str())
    }

    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> Result<(), RemoteError> {
        self.begin(RemoteOp::Update, path.as_str())?;
        {
            let mut documents = self.documents.lock();
            let document = documents
                .entry(path.as_str().to_string())
                .or_insert(Value::Null);
            apply_updates(document, updates);
        }
        self.acknowledge(path.as_str())
    }

    async fn delete(&self, path: &DocPath) -> Result<bool, RemoteError> {
        self.begin(RemoteOp::Delete, path.as_str())?;
        let existed = self.documents.lock().remove(path.as_str()).is_some();
        self.acknowledge(path.as_str())?;
        Ok(existed)
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, RemoteError> {
        self.begin(RemoteOp::Query, collection.as_str())?;
        let documents: Vec<Document> = self
            .documents
            .lock()
            .iter()
            .map(|(path, data)| Document {
                path: DocPath::parse(path.as_str()),
                data: data.clone(),
            })
            .filter(|document| document.path.collection() == *collection)
            .collect();
        Ok(query.evaluate(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusync_protocol::OwnerId;
    use focusync_remote::paths;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn query_lists_direct_children_only() {
        let remote = InMemoryRemote::new();
        let owner = OwnerId::new("u1");
        remote.seed(
            &paths::profiles(&owner).doc("sage"),
            json!({ "companion": "sage" }),
        );
        remote.seed(
            &paths::messages(&owner, focusync_protocol::Companion::Sage).doc("m1"),
            json!({ "content": "hi" }),
        );
        let profiles = remote
            .query(&paths::profiles(&owner), &Query::new())
            .await
            .expect("query");
        assert_eq!(profiles.len(), 1);
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn write_budget_then_failures() {
        let remote = InMemoryRemote::new();
        let path = DocPath::parse("users/u1/goals/g1");
        remote.fail_writes_after(1);
        remote.set(&path, json!({})).await.expect("first write");
        let err = remote
            .update(&path, &[FieldUpdate::increment("n", 1)])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(remote.document(&path), Some(json!({})));
        remote.heal();
        remote
            .update(&path, &[FieldUpdate::increment("n", 1)])
            .await
            .expect("healed");
        assert_eq!(remote.document(&path), Some(json!({ "n": 1 })));
        assert_eq!(remote.write_count(), 3);
    }

    #[tokio::test]
    async fn lost_ack_still_applies_the_write() {
        let remote = InMemoryRemote::new();
        let path = DocPath::parse("users/u1/goals/g1");
        remote.lose_write_acks(1);
        let err = remote
            .update(&path, &[FieldUpdate::increment("n", 2)])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(remote.document(&path), Some(json!({ "n": 2 })));
        remote
            .update(&path, &[FieldUpdate::increment("n", 2)])
            .await
            .expect("acknowledged");
        assert_eq!(remote.document(&path), Some(json!({ "n": 4 })));
    }
}
