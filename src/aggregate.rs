//! AS-scoped flow counters shared across hosts
//!
//! Owned by the aggregation layer and handed to the host dispatcher as an
//! `Arc`. Checks never see the store itself, only a [`AsFlowCounts`]
//! snapshot taken once per dispatch.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Flow counts for one autonomous system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsFlowCounts {
    /// Flows whose client belongs to the AS
    pub as_client: u32,
    /// Flows whose server belongs to the AS
    pub as_server: u32,
}

/// Per-AS flow counters
#[derive(Debug, Default)]
pub struct AsCounterStore {
    counters: RwLock<HashMap<u32, AsFlowCounts>>,
}

impl AsCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one flow between the given client and server ASes
    pub fn record_flow(&self, client_asn: Option<u32>, server_asn: Option<u32>) {
        let mut counters = self.counters.write();
        if let Some(asn) = client_asn {
            let entry = counters.entry(asn).or_default();
            entry.as_client = entry.as_client.saturating_add(1);
        }
        if let Some(asn) = server_asn {
            let entry = counters.entry(asn).or_default();
            entry.as_server = entry.as_server.saturating_add(1);
        }
    }

    /// Overwrite the counters of one AS
    pub fn set(&self, asn: u32, counts: AsFlowCounts) {
        self.counters.write().insert(asn, counts);
    }

    /// Point-in-time copy of one AS's counters
    pub fn snapshot(&self, asn: u32) -> AsFlowCounts {
        self.counters.read().get(&asn).copied().unwrap_or_default()
    }

    /// Drop the counters of one AS (window rollover)
    pub fn reset(&self, asn: u32) {
        self.counters.write().remove(&asn);
    }

    pub fn clear(&self) {
        self.counters.write().clear();
    }

    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }
}
