use anyhow::Result;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Granularity, PriceBar};

pub mod alpha_vantage_client;
pub mod openinsider_client;

pub use alpha_vantage_client::AlphaVantageClient;
pub use openinsider_client::OpenInsiderClient;

/// Fixed-interval rate limiter for outbound provider requests
///
/// Clones share the same bucket, so one limiter handed to several components
/// still spaces their combined calls.
#[derive(Clone)]
pub struct ApiRateLimiter {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    interval: Duration,
}

impl ApiRateLimiter {
    /// One request per `interval`; a zero interval never waits
    pub fn new(interval: Duration) -> Self {
        let limiter =
            Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self { limiter, interval }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Source of historical price bars
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    /// Full bar series for `symbol` at `granularity`. An empty vector means the
    /// provider has no series at that resolution.
    async fn fetch_series(&self, symbol: &str, granularity: Granularity) -> Result<Vec<PriceBar>>;
}

/// Source of the insider purchase listing page
#[async_trait::async_trait]
pub trait FilingSource: Send + Sync {
    async fn fetch_filing_page(&self) -> Result<String>;
}
