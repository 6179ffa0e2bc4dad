//! Owner-partitioned document paths.
//!
//! Every per-user collection lives under `users/{owner}/...`, so a path built
//! for one owner can never address another owner's data.

use focusync_protocol::{Companion, OwnerId};
use std::fmt;

/// Path of a collection, e.g. `users/u1/goals`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a document inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{id}", self.0))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document, e.g. `users/u1/goals/g1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    /// Wrap a raw slash-separated path.
    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Collection containing this document.
    pub fn collection(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builders for the collections each domain syncs against.
pub mod paths {
    use super::*;

    fn user_root(owner: &OwnerId) -> String {
        format!("users/{}", owner.as_str())
    }

    pub fn goals(owner: &OwnerId) -> CollectionPath {
        CollectionPath(format!("{}/goals", user_root(owner)))
    }

    pub fn achievements(owner: &OwnerId) -> CollectionPath {
        CollectionPath(format!("{}/achievements", user_root(owner)))
    }

    /// Per-companion profile documents (affinity and counters).
    pub fn profiles(owner: &OwnerId) -> CollectionPath {
        CollectionPath(format!("{}/companions", user_root(owner)))
    }

    /// Message subcollection of one companion.
    pub fn messages(owner: &OwnerId, companion: Companion) -> CollectionPath {
        CollectionPath(format!(
            "{}/companions/{}/messages",
            user_root(owner),
            companion.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths_are_partitioned_by_owner() {
        let owner = OwnerId::new("u1");
        let doc = paths::messages(&owner, Companion::Tide).doc("m1");
        assert_eq!(doc.as_str(), "users/u1/companions/tide/messages/m1");
        assert_eq!(doc.id(), "m1");
        assert_eq!(
            doc.collection(),
            paths::messages(&owner, Companion::Tide)
        );
        assert_eq!(
            paths::goals(&OwnerId::new("u2")).doc("g1").as_str(),
            "users/u2/goals/g1"
        );
    }
}
