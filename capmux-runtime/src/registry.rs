//! Handler registration by exact canonical URN equality (§6.4).

use crate::handler::CapHandler;
use capmux_urn::{Cap, Urn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct Registration {
    cap: Cap,
    handler: Arc<dyn CapHandler>,
}

/// Maps canonical capability URNs to their registered handler. A second
/// `register` call for the same canonical URN replaces the first, per §6.4.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `cap`, keyed by `cap.urn`'s canonical form.
    /// Replaces any handler previously registered under the same canonical URN.
    pub fn register(&self, cap: Cap, handler: Arc<dyn CapHandler>) {
        let key = cap.urn.canonical();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(&key) {
            tracing::info!(cap_urn = %key, "replacing previously registered handler");
        } else {
            tracing::info!(cap_urn = %key, "registered handler");
        }
        entries.insert(key, Registration { cap, handler });
    }

    /// Looks up the handler registered for exactly `cap_urn` (after
    /// canonicalizing), along with its `Cap` definition. `None` on a miss — the
    /// caller is expected to reply `ERR(NOT_FOUND)`.
    pub fn lookup(&self, cap_urn: &str) -> Option<(Cap, Arc<dyn CapHandler>)> {
        let canonical = Urn::parse_cap(cap_urn).ok()?.canonical();
        let entries = self.entries.read().expect("registry lock poisoned");
        entries
            .get(&canonical)
            .map(|reg| (reg.cap.clone(), reg.handler.clone()))
    }

    /// The canonical URNs of every currently registered capability, in
    /// unspecified order.
    pub fn registered_urns(&self) -> Vec<String> {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.keys().cloned().collect()
    }
}
