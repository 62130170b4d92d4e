use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::api::{ApiRateLimiter, PriceProvider};
use crate::error::InsiderError;
use crate::models::{Granularity, PriceBar, PriceQuote};

/// Bars further than this before the target are still used, with a warning
pub const PRICE_GAP_TOLERANCE_SECS: i64 = 300;

/// Finds the trade price at or just before a timestamp, walking from 1-minute
/// bars down to daily bars until one granularity has a qualifying bar.
pub struct PriceResolver<P> {
    provider: P,
    rate_limiter: ApiRateLimiter,
}

impl<P: PriceProvider> PriceResolver<P> {
    pub fn new(provider: P, rate_limiter: ApiRateLimiter) -> Self {
        Self {
            provider,
            rate_limiter,
        }
    }

    /// `Ok(None)` means no granularity had a bar at or before `target`.
    ///
    /// Provider failures are logged and treated like an empty series, so the
    /// next granularity is still tried. A refused or missing API key fails
    /// every later request too, so it is returned instead.
    pub async fn resolve_price(
        &self,
        ticker: &str,
        target: NaiveDateTime,
    ) -> Result<Option<PriceQuote>> {
        for granularity in Granularity::FALLBACK_ORDER {
            self.rate_limiter.wait().await;

            let bars = match self.provider.fetch_series(ticker, granularity).await {
                Ok(bars) => bars,
                Err(e) if is_fatal(&e) => {
                    return Err(e.context(format!("{} price request for {}", granularity, ticker)));
                }
                Err(e) => {
                    warn!(
                        "⚠️ {} {} price request failed at {}: {:#}",
                        ticker, granularity, target, e
                    );
                    continue;
                }
            };

            let Some(quote) = select_closest_bar(&bars, target, granularity) else {
                debug!("No {} bar at or before {} for {}", granularity, target, ticker);
                continue;
            };

            if quote.gap > Duration::seconds(PRICE_GAP_TOLERANCE_SECS) {
                warn!(
                    "⚠️ {} price for {} is {} minutes before filing {} (bar {})",
                    granularity,
                    ticker,
                    quote.gap.num_minutes(),
                    target,
                    quote.timestamp
                );
            }

            info!(
                "💰 {} @ {}: ${} from {} bar {}",
                ticker, target, quote.close_price, granularity, quote.timestamp
            );
            return Ok(Some(quote));
        }

        warn!("❌ No price found for {} at {}", ticker, target);
        Ok(None)
    }
}

fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<InsiderError>()
        .is_some_and(InsiderError::is_fatal)
}

/// Latest bar not after `target`; among equal timestamps the first in input order wins.
pub fn select_closest_bar(
    bars: &[PriceBar],
    target: NaiveDateTime,
    granularity: Granularity,
) -> Option<PriceQuote> {
    bars.iter()
        .filter(|bar| bar.timestamp <= target)
        .min_by_key(|bar| (target - bar.timestamp, bar.timestamp))
        .map(|bar| PriceQuote {
            timestamp: bar.timestamp,
            close_price: bar.close,
            granularity,
            gap: target - bar.timestamp,
        })
}
