//! Cap table (§3.5): an ordered list of `{cap_urn, plugin_idx}`, rebuilt on every
//! attach/detach, resolved via §4.1 matching with insertion-order tie-break.

use capmux_urn::{best_match, Urn};

struct CapRow {
    urn: Urn,
    plugin_idx: usize,
}

#[derive(Default)]
pub struct CapTable {
    rows: Vec<CapRow>,
}

impl CapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table's contents wholesale. Called whenever the set of running
    /// plugins or their advertised caps changes (attach, detach, death, relay notify).
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = (&'a Urn, usize)>) {
        self.rows = entries
            .into_iter()
            .map(|(urn, plugin_idx)| CapRow {
                urn: urn.clone(),
                plugin_idx,
            })
            .collect();
    }

    /// Resolves the best-specificity match for `cap_urn`, ties broken by insertion
    /// order (§3.5, §4.1 `best_match`).
    pub fn find_plugin_for_cap(&self, cap_urn: &Urn) -> Option<usize> {
        best_match(&self.rows, |row| &row.urn, cap_urn).map(|row| row.plugin_idx)
    }

    /// The current advertised set as sorted, deduplicated canonical URN strings
    /// (§4.5 `capabilities()`). Empty when no plugin is running.
    pub fn capabilities(&self) -> Vec<String> {
        let mut urns: Vec<String> = self.rows.iter().map(|r| r.urn.canonical()).collect();
        urns.sort();
        urns.dedup();
        urns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
