//! §3 Recently-Deleted Set — shields the resync loop from racing a background
//! rebrowse against a node the Structural Change Processor just deleted locally.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use opcua::types::NodeId;
use parking_lot::Mutex;

/// Default expiry window (§3: "e.g., 30 s").
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Map NodeId -> deletion timestamp, with entries expiring after `window`.
pub struct RecentlyDeletedRegistry {
    window: Duration,
    entries: Mutex<HashMap<NodeId, DateTime<Utc>>>,
}

impl RecentlyDeletedRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `node_id` was just removed locally.
    pub fn mark_deleted(&self, node_id: NodeId) {
        self.entries.lock().insert(node_id, Utc::now());
    }

    /// True if `node_id` was deleted within the expiry window. Expired entries are
    /// opportunistically swept on lookup rather than on a timer, since the registry
    /// is only ever consulted from the resync path this is meant to shield.
    pub fn was_recently_deleted(&self, node_id: &NodeId) -> bool {
        let mut entries = self.entries.lock();
        let Some(deleted_at) = entries.get(node_id).copied() else {
            return false;
        };
        let age = Utc::now().signed_duration_since(deleted_at);
        if age.num_milliseconds() as u128 > self.window.as_millis() {
            entries.remove(node_id);
            false
        } else {
            true
        }
    }
}

impl Default for RecentlyDeletedRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
