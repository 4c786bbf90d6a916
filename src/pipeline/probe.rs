//! Verification probing with randomized exponential backoff.
//!
//! One spawned task per identifier per candidate endpoint. The task sleeps a
//! random interval drawn from a growing window between attempts and stops on
//! success or once the window outgrows the give-up ceiling. Attempts within
//! one probe are strictly sequential; the task re-enters its own loop instead
//! of respawning, so there is never more than one in-flight attempt per probe.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{
    Config, ContentId, Endpoint, EventStatus, FIELD_ID, FIELD_SINCE, OutputEvent, Registry,
    since_field,
};
use crate::services::{CachingFetcher, EventSink, FetchOutcome};

/// Backoff schedule parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackoffParams {
    /// Multiplier applied to the window after every draw
    pub growth_rate: f64,
    /// Initial window in milliseconds
    pub initial_ms: u64,
    /// Window size past which the probe abandons
    pub give_up_ms: u64,
}

/// Randomized exponential backoff schedule.
#[derive(Debug)]
pub struct Backoff {
    window_ms: f64,
    params: BackoffParams,
}

impl Backoff {
    pub fn new(params: BackoffParams) -> Self {
        Self {
            window_ms: params.initial_ms as f64,
            params,
        }
    }

    /// Draw the next wait uniformly from `[0, window)`, then grow the window.
    pub fn next_wait(&mut self) -> Duration {
        let wait = rand::rng().random_range(0.0..self.window_ms);
        self.window_ms *= self.params.growth_rate;
        Duration::from_millis(wait as u64)
    }

    /// Whether the grown window has passed the give-up ceiling.
    pub fn exhausted(&self) -> bool {
        self.window_ms > self.params.give_up_ms as f64
    }
}

/// What a probe is verifying.
#[derive(Debug, Clone)]
pub enum ProbeKind {
    /// Retrievability of the content item itself.
    Article,
    /// Presence of the identifier in a notification feed looked back to
    /// `since` (fixed when the probe is spawned).
    Feed { since: DateTime<Utc> },
}

/// One retrying verification task for a single identifier.
#[derive(Debug)]
pub struct Probe {
    pub id: ContentId,
    pub kind: ProbeKind,
    pub candidates: Vec<Endpoint>,
    pub params: BackoffParams,
    /// Emit an output event for every attempt, not only the terminal one
    pub emit_stats: bool,
    /// Emit a terminal event when abandoning past the ceiling
    pub report_abandoned: bool,
}

impl Probe {
    /// Spawn the probe task. `first_wait` jitters the initial attempt so a
    /// burst of concurrently spawned probes does not hit the provider at
    /// once; without it the first wait is drawn from the backoff window.
    pub fn spawn(
        self,
        fetcher: Arc<CachingFetcher>,
        sink: EventSink,
        first_wait: Option<Duration>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(fetcher, sink, first_wait))
    }

    async fn run(mut self, fetcher: Arc<CachingFetcher>, sink: EventSink, first_wait: Option<Duration>) {
        if self.candidates.is_empty() {
            log::debug!("No endpoints to probe for {}", self.id);
            return;
        }

        let mut backoff = Backoff::new(self.params);
        let mut wait = match first_wait {
            Some(wait) => wait,
            None => backoff.next_wait(),
        };

        loop {
            let endpoint = match self.candidates.choose(&mut rand::rng()) {
                Some(endpoint) => endpoint.clone(),
                None => return,
            };
            log::info!(
                "{} ({}): waiting {}ms",
                self.id,
                endpoint.name,
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;

            let status = self.attempt(&endpoint, &fetcher).await;
            log::debug!("{} ({}): status {}", self.id, endpoint.name, status);
            if self.emit_stats {
                sink.emit(OutputEvent::new(&endpoint.name, self.id.clone(), status));
            }

            if status.is_found() {
                log::info!("{} ({}): found, stopping", self.id, endpoint.name);
                return;
            }
            if backoff.exhausted() {
                log::info!("{} ({}): giving up", self.id, endpoint.name);
                if self.report_abandoned {
                    sink.emit(OutputEvent::new(
                        &endpoint.name,
                        self.id.clone(),
                        EventStatus::Abandoned,
                    ));
                }
                return;
            }

            // retry narrowed to the endpoint just tried
            self.candidates = vec![endpoint];
            wait = backoff.next_wait();
        }
    }

    async fn attempt(&self, endpoint: &Endpoint, fetcher: &CachingFetcher) -> EventStatus {
        let url = match self.resolve(endpoint) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("{}: {e}", self.id);
                return EventStatus::Unreachable;
            }
        };
        classify(&self.kind, &self.id, fetcher.fetch(endpoint, &url).await)
    }

    fn resolve(&self, endpoint: &Endpoint) -> Result<String> {
        match &self.kind {
            ProbeKind::Article => endpoint.resolve(&[(FIELD_ID, self.id.to_string())]),
            ProbeKind::Feed { since } => endpoint.resolve(&[
                (FIELD_ID, self.id.to_string()),
                (FIELD_SINCE, since_field(since)),
            ]),
        }
    }
}

/// Map a fetch outcome to the status recorded for one attempt.
fn classify(kind: &ProbeKind, id: &ContentId, outcome: FetchOutcome) -> EventStatus {
    match outcome {
        FetchOutcome::Body(body) => match kind {
            ProbeKind::Article => EventStatus::Http(200),
            ProbeKind::Feed { .. } => {
                if body.contains(id.as_str()) {
                    EventStatus::Http(200)
                } else {
                    EventStatus::AbsentFromFeed
                }
            }
        },
        FetchOutcome::NotFound => EventStatus::Http(404),
        FetchOutcome::Failed(Some(code)) => EventStatus::Http(code),
        FetchOutcome::Failed(None) => EventStatus::Unreachable,
    }
}

/// Uniformly random initial wait below `ceiling_ms`.
fn jitter(ceiling_ms: u64) -> Duration {
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..ceiling_ms))
}

/// Spawn one article probe per delivery endpoint for a newly seen identifier.
///
/// Nothing is spawned when article probing is off, or when neither stats
/// capture nor caching is configured (there would be no observable result).
pub fn spawn_article_probes(
    id: &ContentId,
    registry: &Registry,
    config: &Config,
    fetcher: &Arc<CachingFetcher>,
    sink: &EventSink,
) {
    if !config.probe.articles_enabled() {
        return;
    }
    if !config.probe.article_stats && !fetcher.caching() {
        log::debug!("No stats or caching for {id}, skipping article probes");
        return;
    }

    let params = BackoffParams {
        growth_rate: config.probe.growth_rate,
        initial_ms: config.probe.article_backoff_ms,
        give_up_ms: config.probe.article_give_up_ms,
    };
    for endpoint in &registry.deliveries {
        let probe = Probe {
            id: id.clone(),
            kind: ProbeKind::Article,
            candidates: vec![endpoint.clone()],
            params,
            emit_stats: config.probe.article_stats,
            report_abandoned: config.probe.report_abandoned,
        };
        probe.spawn(
            Arc::clone(fetcher),
            sink.clone(),
            Some(jitter(config.probe.initial_wait_ms)),
        );
    }
}

/// Spawn one feed probe per notification endpoint for a newly seen
/// identifier. `since` is fixed at spawn time.
pub fn spawn_feed_probes(
    id: &ContentId,
    since: DateTime<Utc>,
    registry: &Registry,
    config: &Config,
    fetcher: &Arc<CachingFetcher>,
    sink: &EventSink,
) {
    if !config.probe.feeds_enabled() {
        return;
    }
    if !config.probe.feed_stats && !fetcher.caching() {
        log::debug!("No stats or caching for {id}, skipping feed probes");
        return;
    }

    let params = BackoffParams {
        growth_rate: config.probe.growth_rate,
        initial_ms: config.probe.feed_backoff_ms,
        give_up_ms: config.probe.feed_give_up_ms,
    };
    for endpoint in &registry.notifications {
        let probe = Probe {
            id: id.clone(),
            kind: ProbeKind::Feed { since },
            candidates: vec![endpoint.clone()],
            params,
            emit_stats: config.probe.feed_stats,
            report_abandoned: config.probe.report_abandoned,
        };
        probe.spawn(
            Arc::clone(fetcher),
            sink.clone(),
            Some(jitter(config.probe.initial_wait_ms)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetcherConfig;
    use crate::services::Credentials;
    use crate::storage::ResponseCache;
    use tempfile::TempDir;

    const SAMPLE: &str = "03b49444-16c9-11e5-bd10-00144feabdc0";

    fn sample_id() -> ContentId {
        ContentId::normalize(SAMPLE)
    }

    fn article_endpoint() -> Endpoint {
        Endpoint {
            name: "TEST-ART".into(),
            template: "http://api.example.com/content/{}".into(),
            fields: vec![FIELD_ID.into()],
            needs_key: false,
            needs_cookie: false,
            needs_site_variant: false,
        }
    }

    fn cached_fetcher(dir: &TempDir) -> Arc<CachingFetcher> {
        let config = FetcherConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..FetcherConfig::default()
        };
        Arc::new(CachingFetcher::new(&config, Credentials::default()).unwrap())
    }

    fn fast_params() -> BackoffParams {
        BackoffParams {
            growth_rate: 10.0,
            initial_ms: 1,
            give_up_ms: 5,
        }
    }

    #[test]
    fn backoff_draw_count_is_bounded_by_the_growth_rate() {
        let params = BackoffParams {
            growth_rate: 1.5,
            initial_ms: 250,
            give_up_ms: 20_000,
        };
        let mut backoff = Backoff::new(params);

        let mut draws = 0;
        while !backoff.exhausted() {
            backoff.next_wait();
            draws += 1;
            assert!(draws <= 20, "backoff never reached the ceiling");
        }
        // ceil(log_1.5(20000 / 250)) draws until the window passes the ceiling
        assert_eq!(draws, 11);
    }

    #[test]
    fn backoff_waits_stay_below_the_current_window() {
        let mut backoff = Backoff::new(BackoffParams {
            growth_rate: 2.0,
            initial_ms: 100,
            give_up_ms: 1_000,
        });
        let mut window = 100u64;
        while !backoff.exhausted() {
            assert!(backoff.next_wait() < Duration::from_millis(window));
            window *= 2;
        }
    }

    #[test]
    fn classify_article_body_is_found() {
        let status = classify(&ProbeKind::Article, &sample_id(), FetchOutcome::Body("x".into()));
        assert_eq!(status, EventStatus::Http(200));
    }

    #[test]
    fn classify_feed_body_requires_the_identifier() {
        let kind = ProbeKind::Feed { since: Utc::now() };
        let with_id = format!("{{\"notifications\":[\"{SAMPLE}\"]}}");

        assert_eq!(
            classify(&kind, &sample_id(), FetchOutcome::Body(with_id)),
            EventStatus::Http(200)
        );
        assert_eq!(
            classify(&kind, &sample_id(), FetchOutcome::Body("{}".into())),
            EventStatus::AbsentFromFeed
        );
    }

    #[test]
    fn classify_maps_failures_to_their_status() {
        let id = sample_id();
        assert_eq!(
            classify(&ProbeKind::Article, &id, FetchOutcome::NotFound),
            EventStatus::Http(404)
        );
        assert_eq!(
            classify(&ProbeKind::Article, &id, FetchOutcome::Failed(Some(503))),
            EventStatus::Http(503)
        );
        assert_eq!(
            classify(&ProbeKind::Article, &id, FetchOutcome::Failed(None)),
            EventStatus::Unreachable
        );
    }

    #[tokio::test]
    async fn probe_stops_on_first_success_without_rescheduling() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp);
        let url = format!("http://api.example.com/content/{SAMPLE}");
        ResponseCache::new(tmp.path()).store(&url, "body").await.unwrap();

        let (sink, mut rx) = EventSink::channel();
        let probe = Probe {
            id: sample_id(),
            kind: ProbeKind::Article,
            candidates: vec![article_endpoint()],
            params: fast_params(),
            emit_stats: true,
            report_abandoned: true,
        };
        probe
            .spawn(fetcher, sink, Some(Duration::ZERO))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, EventStatus::Http(200));
        assert_eq!(event.source, "TEST-ART");
        // terminated without another attempt or an abandonment record
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failing_probe_abandons_past_the_ceiling() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp);
        let url = format!("http://api.example.com/content/{SAMPLE}");
        ResponseCache::new(tmp.path()).store_failure(&url).await.unwrap();

        let (sink, mut rx) = EventSink::channel();
        let probe = Probe {
            id: sample_id(),
            kind: ProbeKind::Article,
            candidates: vec![article_endpoint()],
            params: fast_params(),
            emit_stats: true,
            report_abandoned: true,
        };
        probe
            .spawn(fetcher, sink, Some(Duration::ZERO))
            .await
            .unwrap();

        let mut statuses = Vec::new();
        while let Some(event) = rx.recv().await {
            statuses.push(event.status);
        }
        // window: 1 -> 10 (exhausted after the second attempt)
        assert_eq!(
            statuses,
            vec![
                EventStatus::Http(404),
                EventStatus::Http(404),
                EventStatus::Abandoned
            ]
        );
    }

    #[tokio::test]
    async fn quiet_probe_emits_nothing_without_stats() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp);
        let url = format!("http://api.example.com/content/{SAMPLE}");
        ResponseCache::new(tmp.path()).store_failure(&url).await.unwrap();

        let (sink, mut rx) = EventSink::channel();
        let probe = Probe {
            id: sample_id(),
            kind: ProbeKind::Article,
            candidates: vec![article_endpoint()],
            params: fast_params(),
            emit_stats: false,
            report_abandoned: false,
        };
        probe
            .spawn(fetcher, sink, Some(Duration::ZERO))
            .await
            .unwrap();

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn jitter_respects_the_ceiling() {
        assert_eq!(jitter(0), Duration::ZERO);
        for _ in 0..50 {
            assert!(jitter(10) < Duration::from_millis(10));
        }
    }
}
