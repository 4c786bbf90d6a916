//! Discovery polling loop.
//!
//! On a fixed cycle, fetches each configured notification endpoint, extracts
//! the identifiers present in the response, and diffs against the previous
//! cycle's snapshot. Every identifier that is new gets a discovery event and
//! a fan-out of article probes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::error::Result;
use crate::models::{Config, ContentId, Endpoint, EventStatus, FIELD_SINCE, OutputEvent, Registry, since_field};
use crate::pipeline::probe::spawn_article_probes;
use crate::pipeline::snapshot::SnapshotStore;
use crate::services::{CachingFetcher, EventSink, FetchOutcome};

/// Discovery poller: detects new identifiers on notification endpoints.
pub struct Poller {
    registry: Arc<Registry>,
    config: Arc<Config>,
    fetcher: Arc<CachingFetcher>,
    sink: EventSink,
    snapshots: SnapshotStore,
}

impl Poller {
    pub fn new(
        registry: Arc<Registry>,
        config: Arc<Config>,
        fetcher: Arc<CachingFetcher>,
        sink: EventSink,
    ) -> Self {
        Self {
            registry,
            config,
            fetcher,
            sink,
            snapshots: SnapshotStore::new(),
        }
    }

    /// Run the polling loop for the configured number of cycles
    /// (forever when unset). Fails fast on an unknown endpoint name.
    pub async fn run(&mut self) -> Result<()> {
        let mut endpoints = Vec::new();
        for name in &self.config.poller.endpoints {
            endpoints.push(self.registry.notification(name)?.clone());
        }
        log::info!(
            "Polling {:?} every {}s",
            self.config.poller.endpoints,
            self.config.poller.poll_interval_secs
        );

        let poll_interval = Duration::from_secs(self.config.poller.poll_interval_secs);
        let mut remaining = self.config.poller.repeat;
        if remaining == Some(0) {
            return Ok(());
        }

        loop {
            // randomized visit order avoids a fixed load pattern
            endpoints.shuffle(&mut rand::rng());
            self.cycle(&endpoints).await;

            if let Some(n) = remaining.as_mut() {
                *n -= 1;
                if *n == 0 {
                    break;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
        Ok(())
    }

    /// One pass over the notification endpoints. A single endpoint's failure
    /// degrades only that endpoint's discovery, never the cycle.
    async fn cycle(&mut self, endpoints: &[Endpoint]) {
        let since = Utc::now() - chrono::Duration::seconds(self.config.poller.since_secs() as i64);

        for endpoint in endpoints {
            let url = match endpoint.resolve(&[(FIELD_SINCE, since_field(&since))]) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("Skipping {}: {e}", endpoint.name);
                    continue;
                }
            };

            let FetchOutcome::Body(body) = self.fetcher.fetch(endpoint, &url).await else {
                log::warn!("No response from {}", endpoint.name);
                continue;
            };

            let ids: HashSet<ContentId> = ContentId::extract_all(&body).into_iter().collect();
            let total = ids.len();
            let primed = self.snapshots.is_primed(&endpoint.name);
            let new_ids = self.snapshots.advance(&endpoint.name, ids);

            if !primed {
                // priming read: store the snapshot, emit nothing
                log::debug!("{}: primed with {} ids", endpoint.name, total);
                continue;
            }
            log::debug!("{}: {} new ids out of {}", endpoint.name, new_ids.len(), total);

            for id in new_ids {
                self.sink.emit(OutputEvent::new(
                    &endpoint.name,
                    id.clone(),
                    EventStatus::Discovered,
                ));
                spawn_article_probes(&id, &self.registry, &self.config, &self.fetcher, &self.sink);
            }
        }
    }
}
