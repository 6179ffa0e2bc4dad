//! Per-store sync bookkeeping and the cooldown that rate-limits remote contact.

use chrono::{DateTime, TimeDelta, Utc};
use focusync_protocol::OwnerId;
use serde::{Deserialize, Serialize};

/// Owner the cache belongs to and when it last synced successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub owner: Option<OwnerId>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncMetadata {
    pub fn for_owner(owner: Option<OwnerId>) -> Self {
        Self {
            owner,
            last_sync_at: None,
        }
    }

    pub fn belongs_to(&self, owner: &OwnerId) -> bool {
        self.owner.as_ref() == Some(owner)
    }

    /// Whether a sync at `now` may contact the remote store.
    pub fn should_contact(&self, now: DateTime<Utc>, cooldown: TimeDelta, force: bool) -> bool {
        if force {
            return true;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => now - last >= cooldown,
        }
    }
}

/// Convert a configured cooldown in seconds to a [`TimeDelta`].
pub fn cooldown_from_secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let start = Utc::now();
        let meta = SyncMetadata {
            owner: Some(OwnerId::new("u1")),
            last_sync_at: Some(start),
        };
        let cooldown = cooldown_from_secs(60);
        assert!(!meta.should_contact(start + TimeDelta::seconds(59), cooldown, false));
        assert!(meta.should_contact(start + TimeDelta::seconds(59), cooldown, true));
        assert!(meta.should_contact(start + TimeDelta::seconds(60), cooldown, false));
        assert!(SyncMetadata::default().should_contact(start, cooldown, false));
    }

    #[test]
    fn oversized_cooldown_saturates() {
        assert_eq!(cooldown_from_secs(u64::MAX), TimeDelta::MAX);
    }
}
