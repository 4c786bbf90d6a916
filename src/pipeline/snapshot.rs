//! Snapshot bookkeeping for the discovery poller.
//!
//! Tracks the set of identifiers most recently observed per notification
//! endpoint and computes which ones are new since the previous cycle. The
//! first observation of an endpoint primes its snapshot and reports nothing,
//! so a fresh start does not backfill the provider's entire recent history.

use std::collections::{HashMap, HashSet};

use crate::models::ContentId;

/// Per-endpoint record of the identifiers seen in the latest response.
///
/// Owned and mutated by the single poller task; each cycle replaces an
/// endpoint's set wholesale, never merges into it.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    seen: HashMap<String, HashSet<ContentId>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the endpoint has been observed at least once.
    pub fn is_primed(&self, endpoint: &str) -> bool {
        self.seen.contains_key(endpoint)
    }

    /// Replace the snapshot for `endpoint` and return the identifiers that
    /// are new relative to the previous cycle.
    ///
    /// The endpoint's first cycle is a priming read: the snapshot is stored
    /// and nothing is reported.
    pub fn advance(&mut self, endpoint: &str, current: HashSet<ContentId>) -> Vec<ContentId> {
        let new_ids = match self.seen.get(endpoint) {
            Some(previous) => current.difference(previous).cloned().collect(),
            None => Vec::new(),
        };
        self.seen.insert(endpoint.to_string(), current);
        new_ids
    }
}
