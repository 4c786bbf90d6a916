//! Stdin identifier ingestion.
//!
//! Alternate identifier source for testing and backfill: scans incoming
//! lines for identifier-shaped tokens, deduplicates against a
//! process-lifetime seen-set, and feeds each new identifier to the prober.
//! Exhaustion of the stream is fatal — there is no further source of work.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{AppError, Result};
use crate::models::{Config, ContentId, EventStatus, OutputEvent, Registry};
use crate::pipeline::probe::{spawn_article_probes, spawn_feed_probes};
use crate::services::{CachingFetcher, EventSink};

/// Source name recorded for identifiers read from standard input.
const SOURCE_STDIN: &str = "STDIN";

/// Line-oriented identifier source reading standard input.
pub struct StdinSource {
    registry: Arc<Registry>,
    config: Arc<Config>,
    fetcher: Arc<CachingFetcher>,
    sink: EventSink,
    seen: HashSet<ContentId>,
}

impl StdinSource {
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
            seen: HashSet::new(),
        }
    }

    /// Consume stdin until it is exhausted. Always ends with
    /// [`AppError::InputExhausted`]; probes still in flight are abandoned
    /// when the process exits.
    pub async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            self.ingest_line(&line);
        }
        Err(AppError::InputExhausted)
    }

    /// Extract new identifiers from one input line, emit a discovery for
    /// each, and fan out article and feed probes.
    fn ingest_line(&mut self, line: &str) {
        log::info!("Got line: {line}");
        let since = Utc::now() - chrono::Duration::seconds(self.config.poller.since_secs() as i64);

        for id in ContentId::extract_all(line) {
            if !self.seen.insert(id.clone()) {
                continue;
            }
            self.sink.emit(OutputEvent::new(
                SOURCE_STDIN,
                id.clone(),
                EventStatus::Discovered,
            ));
            spawn_article_probes(&id, &self.registry, &self.config, &self.fetcher, &self.sink);
            spawn_feed_probes(
                &id,
                since,
                &self.registry,
                &self.config,
                &self.fetcher,
                &self.sink,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Endpoint;
    use crate::services::Credentials;
    use crate::storage::ResponseCache;
    use tempfile::TempDir;

    const SAMPLE: &str = "03b49444-16c9-11e5-bd10-00144feabdc0";
    const ART_URL: &str = "http://art.example.com/03b49444-16c9-11e5-bd10-00144feabdc0";
    const FEED_URL: &str = "http://feeds.example.com/all";

    fn test_registry() -> Registry {
        Registry {
            notifications: vec![Endpoint {
                name: "FEED".into(),
                template: FEED_URL.into(),
                fields: vec![],
                needs_key: false,
                needs_cookie: false,
                needs_site_variant: false,
            }],
            deliveries: vec![Endpoint {
                name: "ART".into(),
                template: "http://art.example.com/{}".into(),
                fields: vec!["id".into()],
                needs_key: false,
                needs_cookie: false,
                needs_site_variant: false,
            }],
        }
    }

    fn test_source(
        dir: &TempDir,
        mut config: Config,
    ) -> (StdinSource, tokio::sync::mpsc::UnboundedReceiver<OutputEvent>) {
        config.fetcher.cache_dir = Some(dir.path().to_path_buf());
        config.fetcher.timeout_secs = 2;

        let fetcher =
            Arc::new(CachingFetcher::new(&config.fetcher, Credentials::default()).unwrap());
        let (sink, rx) = EventSink::channel();
        let source = StdinSource::new(
            Arc::new(test_registry()),
            Arc::new(config),
            fetcher,
            sink,
        );
        (source, rx)
    }

    #[tokio::test]
    async fn repeated_identifier_is_discovered_once() {
        let tmp = TempDir::new().unwrap();
        let (mut source, mut rx) = test_source(&tmp, Config::default());

        source.ingest_line(&format!("first sighting {SAMPLE}"));
        source.ingest_line(&format!("second sighting {SAMPLE}"));
        drop(source);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "STDIN");
        assert_eq!(event.status, EventStatus::Discovered);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn lines_without_identifiers_emit_nothing() {
        let tmp = TempDir::new().unwrap();
        let (mut source, mut rx) = test_source(&tmp, Config::default());

        source.ingest_line("no identifiers here");
        drop(source);

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn both_candidate_sets_are_probed_for_one_discovery() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());
        cache.store_failure(ART_URL).await.unwrap();
        cache.store(FEED_URL, "[]").await.unwrap();

        let mut config = Config::default();
        config.probe.article_stats = true;
        config.probe.feed_stats = true;
        config.probe.initial_wait_ms = 0;
        config.probe.growth_rate = 10.0;
        config.probe.article_backoff_ms = 1;
        config.probe.article_give_up_ms = 5;
        config.probe.feed_backoff_ms = 1;
        config.probe.feed_give_up_ms = 5;

        let (mut source, mut rx) = test_source(&tmp, config);
        source.ingest_line(&format!("{SAMPLE} and again {SAMPLE}"));
        drop(source);

        let mut discoveries = 0;
        let mut sources = std::collections::HashSet::new();
        while let Some(event) = rx.recv().await {
            if event.status == EventStatus::Discovered {
                discoveries += 1;
            } else {
                sources.insert(event.source.clone());
            }
        }
        // one discovery, but independent attempts against both candidate sets
        assert_eq!(discoveries, 1);
        assert!(sources.contains("ART"));
        assert!(sources.contains("FEED"));
    }
}
