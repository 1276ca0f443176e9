use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use rand::Rng;
use reqwest::Client;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::types::{FetchConfig, Result, SummarizerError};

/// The injected HTTP capability: GET a URL, get the body text back.
/// Non-success status codes surface as errors.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// Default `HttpFetch` backed by reqwest.
pub struct ReqwestFetch {
    client: Client,
}

impl ReqwestFetch {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SummarizerError::General(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(response.text().await?)
    }
}

/// Feed fetcher with per-host politeness and transient-error retries.
///
/// Each request gets a randomized jitter delay, and requests to the same host
/// are spaced at least `min_host_interval_ms` apart. The per-host table is
/// process-lifetime, grow-only, and never blocks fetches to unrelated hosts.
pub struct Fetcher {
    http: Arc<dyn HttpFetch>,
    config: FetchConfig,
    host_slots: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(http: Arc<dyn HttpFetch>, config: FetchConfig) -> Self {
        Self {
            http,
            config,
            host_slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch one feed document, retrying transient failures with
    /// exponential backoff.
    pub async fn fetch_feed(&self, url: &str) -> Result<String> {
        self.wait_for_slot(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match self.http.get_text(url).await {
                Ok(body) => {
                    debug!("Fetched {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SummarizerError::General(format!("fetch failed: {}", url))))
    }

    /// Reserve the next allowed instant for this host, then sleep until it.
    /// The reservation is made under the lock; the sleep is not, so slow
    /// hosts never delay fetches to other hosts.
    async fn wait_for_slot(&self, url: &str) -> Result<()> {
        let host = Url::parse(url)?
            .host_str()
            .unwrap_or("unknown")
            .to_string();

        let jitter_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.config.jitter_min_ms..=self.config.jitter_max_ms.max(self.config.jitter_min_ms))
        };
        let spacing = Duration::from_millis(self.config.min_host_interval_ms);

        let wake_at = {
            let mut slots = self.host_slots.write().await;
            let now = Instant::now();
            let earliest = match slots.get(&host) {
                Some(&last) => (last + spacing).max(now),
                None => now,
            };
            let wake_at = earliest + Duration::from_millis(jitter_ms);
            slots.insert(host.clone(), wake_at);
            wake_at
        };

        let wait = wake_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!("Delaying fetch to {} by {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyFetch {
        failures_before_success: AtomicU32,
    }

    #[async_trait]
    impl HttpFetch for FlakyFetch {
        async fn get_text(&self, _url: &str) -> Result<String> {
            if self.failures_before_success.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(SummarizerError::General("HTTP 502: Bad Gateway".to_string()))
            } else {
                Ok("<rss></rss>".to_string())
            }
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            retry_delay_seconds: 0,
            min_host_interval_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let http = Arc::new(FlakyFetch {
            failures_before_success: AtomicU32::new(2),
        });
        let fetcher = Fetcher::new(http, fast_config());

        let body = fetcher.fetch_feed("https://example.com/feed.xml").await.unwrap();
        assert_eq!(body, "<rss></rss>");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let http = Arc::new(FlakyFetch {
            failures_before_success: AtomicU32::new(100),
        });
        let fetcher = Fetcher::new(http, fast_config());

        assert!(fetcher.fetch_feed("https://example.com/feed.xml").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn same_host_fetches_are_spaced() {
        struct CountingFetch {
            calls: AtomicU32,
        }

        #[async_trait]
        impl HttpFetch for CountingFetch {
            async fn get_text(&self, _url: &str) -> Result<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(String::new())
            }
        }

        let config = FetchConfig {
            min_host_interval_ms: 1_000,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            retry_delay_seconds: 0,
            ..Default::default()
        };
        let fetcher = Fetcher::new(
            Arc::new(CountingFetch {
                calls: AtomicU32::new(0),
            }),
            config,
        );

        let started = Instant::now();
        fetcher.fetch_feed("https://example.com/a").await.unwrap();
        fetcher.fetch_feed("https://example.com/b").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }
}
