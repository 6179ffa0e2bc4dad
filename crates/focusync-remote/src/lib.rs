//! Remote document-store seam used by the sync engine.
//!
//! The hosted store is an external collaborator; this crate only describes the
//! operations the engine needs and the owner-partitioned document layout.

mod error;
mod path;
mod update;

pub use error::RemoteError;
pub use path::{CollectionPath, DocPath, paths};
pub use update::{FieldUpdate, Query, SortDirection, apply_updates};

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A document returned by a collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Full path of the document.
    pub path: DocPath,
    /// Document body.
    pub data: Value,
}

impl Document {
    /// Decode the body into a record, skipping malformed documents.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        decode_document(&self.path, self.data.clone())
    }
}

/// Minimal async interface of the hosted document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a single document.
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, RemoteError>;
    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, data: Value) -> Result<(), RemoteError>;
    /// Apply field updates; a missing document is created from the updates.
    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> Result<(), RemoteError>;
    /// Delete a document, returning whether it existed.
    async fn delete(&self, path: &DocPath) -> Result<bool, RemoteError>;
    /// List documents directly under a collection.
    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, RemoteError>;
}

/// Decode a remote document, logging and discarding it when it does not match
/// the expected shape.
pub fn decode_document<T: DeserializeOwned>(path: &DocPath, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("malformed remote document ignored (path={path}): {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        title: String,
    }

    #[test]
    fn malformed_documents_decode_to_none() {
        let path = DocPath::parse("users/u1/goals/g1");
        assert_eq!(
            decode_document::<Sample>(&path, json!({ "title": "read" })),
            Some(Sample {
                title: "read".to_string()
            })
        );
        assert_eq!(decode_document::<Sample>(&path, json!({ "title": 3 })), None);
    }
}
