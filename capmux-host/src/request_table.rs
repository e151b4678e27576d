//! Request table (§3.4): `id -> {plugin_idx, created_at}`, populated on `REQ` and
//! cleared when a terminal frame for that `id` is forwarded to the engine.

use capmux_wire::MessageId;
use std::collections::HashMap;
use std::time::Instant;

/// One pending request's bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct RequestEntry {
    pub plugin_idx: usize,
    pub created_at: Instant,
}

#[derive(Default)]
pub struct RequestTable {
    entries: HashMap<MessageId, RequestEntry>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new in-flight request, owned by `plugin_idx`.
    pub fn insert(&mut self, id: MessageId, plugin_idx: usize) {
        self.entries.insert(
            id,
            RequestEntry {
                plugin_idx,
                created_at: Instant::now(),
            },
        );
    }

    /// The plugin a pending `id` is routed to, if any.
    pub fn plugin_for(&self, id: &MessageId) -> Option<usize> {
        self.entries.get(id).map(|e| e.plugin_idx)
    }

    /// Deletes `id`'s entry, called once its terminal frame has been forwarded.
    pub fn remove(&mut self, id: &MessageId) -> Option<RequestEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every pending id owned by `plugin_idx`, removed from the table. Used to drive
    /// the `ERR(PLUGIN_DIED)` fan-out when a plugin stream dies (§4.5 rule 3).
    pub fn drain_for_plugin(&mut self, plugin_idx: usize) -> Vec<MessageId> {
        let ids: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.plugin_idx == plugin_idx)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }
}
