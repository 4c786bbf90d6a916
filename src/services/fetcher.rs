//! Caching fetch layer.
//!
//! Wraps the HTTP client with the on-disk response cache, the inter-request
//! throttle, and credential header attachment. Transient trouble (network
//! errors, unexpected statuses, undecodable bodies) is absorbed into
//! [`FetchOutcome`]; only "not found" stays distinguishable so probes can
//! decide to retry elsewhere instead of treating it as success.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::COOKIE;

use crate::error::Result;
use crate::models::{Endpoint, FetcherConfig};
use crate::storage::{CacheEntry, ResponseCache};
use crate::utils::http;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-Api-Key";

/// Site-selector directive prepended to the cookie for variant endpoints.
const SITE_VARIANT_COOKIE: &str = "FT_SITE=NEXT; ";

/// Typed result of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Response body, either freshly fetched or served from the cache.
    Body(String),
    /// The resource does not exist: an upstream 404 or a recorded failure.
    NotFound,
    /// Transient failure, no body; carries the status code when one was
    /// received.
    Failed(Option<u16>),
}

/// Credentials attached to outgoing requests when an endpoint asks for them.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub key: Option<String>,
    pub cookie: Option<String>,
}

/// HTTP fetcher with optional response caching and throttling.
pub struct CachingFetcher {
    client: Client,
    credentials: Credentials,
    cache: Option<ResponseCache>,
    cache_errors: bool,
    throttle: Duration,
}

impl CachingFetcher {
    /// Create a fetcher from configuration and resolved credentials.
    pub fn new(config: &FetcherConfig, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(config)?,
            credentials,
            cache: config.cache_dir.as_ref().map(ResponseCache::new),
            cache_errors: config.cache_errors,
            throttle: Duration::from_millis(config.throttle_ms),
        })
    }

    /// Whether responses are being cached.
    pub fn caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Fetch a resolved URL on behalf of an endpoint.
    ///
    /// With caching enabled the cache is consulted first: a recorded failure
    /// short-circuits to `NotFound` and a stored body is returned without
    /// touching the network. On a miss the throttle delay is applied, the
    /// request performed, and the result persisted (failures only when
    /// error-caching is on). Cache I/O trouble degrades to a miss.
    pub async fn fetch(&self, endpoint: &Endpoint, url: &str) -> FetchOutcome {
        let Some(cache) = &self.cache else {
            return self.fetch_direct(endpoint, url).await;
        };

        match cache.lookup(url).await {
            Ok(Some(CacheEntry::Body(body))) => {
                log::info!("Cache hit: {url}");
                return FetchOutcome::Body(body);
            }
            Ok(Some(CacheEntry::Failure)) => {
                log::info!("Cache hit (recorded failure): {url}");
                return FetchOutcome::NotFound;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cache read failed for {url}: {e}"),
        }

        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }

        let outcome = self.fetch_direct(endpoint, url).await;
        match &outcome {
            FetchOutcome::Body(body) => {
                log::debug!("Cache write: {url}");
                if let Err(e) = cache.store(url, body).await {
                    log::warn!("Cache write failed for {url}: {e}");
                }
            }
            FetchOutcome::NotFound | FetchOutcome::Failed(_) if self.cache_errors => {
                if let Err(e) = cache.store_failure(url).await {
                    log::warn!("Cache write failed for {url}: {e}");
                }
            }
            _ => {}
        }
        outcome
    }

    /// Perform the request without consulting the cache.
    async fn fetch_direct(&self, endpoint: &Endpoint, url: &str) -> FetchOutcome {
        log::info!(
            "GET: {} {} {} {}",
            if endpoint.needs_key { "key" } else { "   " },
            if endpoint.needs_site_variant { "next" } else { "    " },
            if endpoint.needs_cookie { "cookie" } else { "      " },
            url
        );

        let mut request = self.client.get(url);
        if endpoint.needs_key {
            if let Some(key) = &self.credentials.key {
                request = request.header(API_KEY_HEADER, key);
            }
        }
        if let Some(cookie) = self.cookie_for(endpoint) {
            request = request.header(COOKIE, cookie);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("API error for {url}: {e}");
                return FetchOutcome::Failed(e.status().map(|s| s.as_u16()));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }
        if status.is_client_error() || status.is_server_error() {
            log::warn!("Got unexpected HTTP status {status} for {url}");
            return FetchOutcome::Failed(Some(status.as_u16()));
        }

        match response.bytes().await {
            Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(body) => FetchOutcome::Body(body),
                Err(_) => {
                    log::warn!("Response for {url} was not valid UTF-8");
                    FetchOutcome::Failed(None)
                }
            },
            Err(e) => {
                log::warn!("Failed to read body for {url}: {e}");
                FetchOutcome::Failed(None)
            }
        }
    }

    /// Cookie header value for an endpoint, if one should be attached.
    ///
    /// The site-variant directive is sent even without a session cookie.
    fn cookie_for(&self, endpoint: &Endpoint) -> Option<String> {
        let session = if endpoint.needs_cookie {
            self.credentials.cookie.as_deref()
        } else {
            None
        };
        match (endpoint.needs_site_variant, session) {
            (true, Some(cookie)) => Some(format!("{SITE_VARIANT_COOKIE}{cookie}")),
            (true, None) => Some(SITE_VARIANT_COOKIE.to_string()),
            (false, Some(cookie)) => Some(cookie.to_string()),
            (false, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn endpoint(needs_key: bool, needs_cookie: bool, needs_site_variant: bool) -> Endpoint {
        Endpoint {
            name: "TEST".into(),
            template: "http://api.example.com/content/{}".into(),
            fields: vec!["id".into()],
            needs_key,
            needs_cookie,
            needs_site_variant,
        }
    }

    fn cached_fetcher(dir: &TempDir, credentials: Credentials) -> CachingFetcher {
        let config = FetcherConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..FetcherConfig::default()
        };
        CachingFetcher::new(&config, credentials).unwrap()
    }

    const URL: &str = "http://api.example.com/content/abc";

    #[tokio::test]
    async fn cached_body_short_circuits_the_network() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp, Credentials::default());

        ResponseCache::new(tmp.path())
            .store(URL, "cached body")
            .await
            .unwrap();

        // URL resolves nowhere; a hit must come purely from the cache
        let outcome = fetcher.fetch(&endpoint(false, false, false), URL).await;
        assert_eq!(outcome, FetchOutcome::Body("cached body".into()));
    }

    #[tokio::test]
    async fn recorded_failure_short_circuits_to_not_found() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp, Credentials::default());

        ResponseCache::new(tmp.path())
            .store_failure(URL)
            .await
            .unwrap();

        let outcome = fetcher.fetch(&endpoint(false, false, false), URL).await;
        assert_eq!(outcome, FetchOutcome::NotFound);
    }

    #[test]
    fn cookie_attached_only_when_requested_and_present() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(
            &tmp,
            Credentials {
                key: None,
                cookie: Some("session=s3cret".into()),
            },
        );

        assert_eq!(fetcher.cookie_for(&endpoint(false, false, false)), None);
        assert_eq!(
            fetcher.cookie_for(&endpoint(false, true, false)),
            Some("session=s3cret".into())
        );
    }

    #[test]
    fn site_variant_prefixes_the_cookie() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(
            &tmp,
            Credentials {
                key: None,
                cookie: Some("session=s3cret".into()),
            },
        );

        assert_eq!(
            fetcher.cookie_for(&endpoint(false, true, true)),
            Some("FT_SITE=NEXT; session=s3cret".into())
        );
    }

    #[test]
    fn site_variant_sent_even_without_a_session_cookie() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp, Credentials::default());

        assert_eq!(
            fetcher.cookie_for(&endpoint(false, true, true)),
            Some("FT_SITE=NEXT; ".into())
        );
    }

    #[test]
    fn missing_cookie_disables_the_header() {
        let tmp = TempDir::new().unwrap();
        let fetcher = cached_fetcher(&tmp, Credentials::default());

        assert_eq!(fetcher.cookie_for(&endpoint(false, true, false)), None);
    }
}
