//! Refcounted subject <-> NodeId association (§3, §9 design note).
//!
//! A subject reachable from more than one parent in the local graph is only
//! unregistered — and its monitored items only detached — when its last
//! referencing parent is removed.

use std::collections::HashMap;

use opcua::types::NodeId;
use parking_lot::Mutex;

use super::model::SubjectId;
use crate::subscription::manager::MonitoredItemSpec;

struct Entry {
    node_id: NodeId,
    refcount: u32,
    items: Vec<MonitoredItemSpec>,
}

/// Tracks, for each registered [`SubjectId`], the server node it is bound to, how
/// many parents currently reference it, and the monitored items attached on its
/// behalf.
#[derive(Default)]
pub struct SubjectRegistry {
    entries: Mutex<HashMap<SubjectId, Entry>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh binding, or add a reference to an already-registered
    /// subject (shared subject reached from a second parent).
    pub fn register(&self, subject: SubjectId, node_id: NodeId, items: Vec<MonitoredItemSpec>) {
        let mut entries = self.entries.lock();
        entries
            .entry(subject)
            .and_modify(|entry| entry.refcount += 1)
            .or_insert(Entry {
                node_id,
                refcount: 1,
                items,
            });
    }

    pub fn node_id_of(&self, subject: SubjectId) -> Option<NodeId> {
        self.entries.lock().get(&subject).map(|e| e.node_id.clone())
    }

    pub fn is_registered(&self, subject: SubjectId) -> bool {
        self.entries.lock().contains_key(&subject)
    }

    /// Drop one reference. Returns the subject's node id and monitored items if
    /// this was the last reference (the caller must detach them from the
    /// Subscription Manager), or `None` if the subject is still referenced
    /// elsewhere.
    pub fn unregister(&self, subject: SubjectId) -> Option<(NodeId, Vec<MonitoredItemSpec>)> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&subject) else {
            return None;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 {
            entries.remove(&subject).map(|e| (e.node_id, e.items))
        } else {
            None
        }
    }
}
