//! Rate-limited HTTP fetching against a single external source.
//!
//! Every [`RateLimitedFetcher`] owns one token bucket. Clones share it, so all
//! concurrent searches against the same source draw from the same budget.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use reqwest::header::ACCEPT_LANGUAGE;
use tracing::debug;

use mathprereq_shared::{DiscoveryConfig, MathPrereqError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Build the HTTP client shared by all source fetchers.
pub fn build_http_client(config: &DiscoveryConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| MathPrereqError::Network(format!("failed to build HTTP client: {e}")))
}

/// Polite GET client for one source: waits for a rate-limit token, then fetches.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    source: &'static str,
    client: Client,
    limiter: Arc<DirectLimiter>,
    /// Longest we block waiting for a token before giving up.
    wait_timeout: Duration,
}

impl std::fmt::Debug for RateLimitedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedFetcher")
            .field("source", &self.source)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

impl RateLimitedFetcher {
    /// Create a fetcher allowing `requests_per_second` with a burst of one.
    pub fn new(
        source: &'static str,
        client: Client,
        requests_per_second: u32,
        wait_timeout: Duration,
    ) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        Self {
            source,
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            wait_timeout,
        }
    }

    /// Create a fetcher from discovery settings.
    pub fn from_config(source: &'static str, client: Client, config: &DiscoveryConfig) -> Self {
        Self::new(
            source,
            client,
            config.requests_per_second,
            config.request_timeout,
        )
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Block until a token is available, or fail once `wait_timeout` passes.
    pub async fn acquire(&self) -> Result<()> {
        tokio::time::timeout(self.wait_timeout, self.limiter.until_ready())
            .await
            .map_err(|_| {
                MathPrereqError::timeout(
                    format!("{} rate-limit wait", self.source),
                    self.wait_timeout,
                )
            })
    }

    /// GET `url` and return the body text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.acquire().await?;
        debug!(source = self.source, %url, "fetching");

        let response = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| MathPrereqError::Network(format!("{}: {url}: {e}", self.source)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MathPrereqError::Network(format!(
                "{}: {url}: HTTP {status}",
                self.source
            )));
        }

        response.text().await.map_err(|e| {
            MathPrereqError::Network(format!("{}: {url}: body read failed: {e}", self.source))
        })
    }
}
