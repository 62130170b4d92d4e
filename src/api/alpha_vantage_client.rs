use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

use super::PriceProvider;
use crate::error::InsiderError;
use crate::models::{Config, Granularity, PriceBar};

const INTRADAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DAILY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d";
const CLOSE_FIELD: &str = "4. close";
/// Daily closes are only known once the session ends
const MARKET_CLOSE_HOUR: u32 = 16;

/// Alpha Vantage time series client
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    /// Create a client; fails fast when no API key is configured
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent("insider-buys/0.1")
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.alpha_vantage_base_url.clone(),
        })
    }

    fn series_url(&self, symbol: &str, granularity: Granularity) -> Result<Url> {
        let mut params = vec![("symbol", symbol), ("outputsize", "full")];
        match granularity {
            Granularity::OneMinute => {
                params.push(("function", "TIME_SERIES_INTRADAY"));
                params.push(("interval", "1min"));
            }
            Granularity::FiveMinute => {
                params.push(("function", "TIME_SERIES_INTRADAY"));
                params.push(("interval", "5min"));
            }
            Granularity::Daily => params.push(("function", "TIME_SERIES_DAILY")),
        }
        params.push(("apikey", self.api_key.as_str()));

        Ok(Url::parse_with_params(&self.base_url, &params)?)
    }
}

#[async_trait::async_trait]
impl PriceProvider for AlphaVantageClient {
    async fn fetch_series(&self, symbol: &str, granularity: Granularity) -> Result<Vec<PriceBar>> {
        let url = self.series_url(symbol, granularity)?;

        // The URL carries the API key, so only log what was asked for
        debug!("Requesting {} series for {}", granularity, symbol);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(InsiderError::Status {
                status: response.status().as_u16(),
                url: self.base_url.clone(),
            }
            .into());
        }

        let body: Value = response.json().await?;
        let bars = parse_series(symbol, granularity, &body)?;

        debug!("Retrieved {} {} bars for {}", bars.len(), granularity, symbol);
        Ok(bars)
    }
}

fn series_key(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::OneMinute => "Time Series (1min)",
        Granularity::FiveMinute => "Time Series (5min)",
        Granularity::Daily => "Time Series (Daily)",
    }
}

/// Turn an Alpha Vantage JSON body into bars sorted oldest first.
///
/// A body without the series but with a message naming `apikey` means the key
/// was refused. Otherwise `Note`/`Information` is a throttling notice and
/// `Error Message` is a rejected request for this symbol. Anything else
/// without a series yields no bars.
pub fn parse_series(
    symbol: &str,
    granularity: Granularity,
    body: &Value,
) -> Result<Vec<PriceBar>, InsiderError> {
    let Some(series) = body.get(series_key(granularity)).and_then(Value::as_object) else {
        if let Some(message) = ["Error Message", "Information", "Note"]
            .iter()
            .filter_map(|field| body.get(*field).and_then(Value::as_str))
            .find(|message| message.to_ascii_lowercase().contains("apikey"))
        {
            return Err(InsiderError::InvalidApiKey(message.to_string()));
        }
        if let Some(message) = body
            .get("Note")
            .or_else(|| body.get("Information"))
            .and_then(Value::as_str)
        {
            return Err(InsiderError::Throttled {
                symbol: symbol.to_string(),
                message: message.to_string(),
            });
        }
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Err(InsiderError::Provider {
                symbol: symbol.to_string(),
                granularity,
                message: message.to_string(),
            });
        }
        return Ok(Vec::new());
    };

    let mut bars = Vec::with_capacity(series.len());
    for (stamp, fields) in series {
        let Some(timestamp) = parse_bar_timestamp(stamp, granularity) else {
            warn!("⚠️ Skipping {} bar with bad timestamp {:?} for {}", granularity, stamp, symbol);
            continue;
        };
        let close = fields
            .get(CLOSE_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| Decimal::from_str(raw.trim()).ok());
        match close {
            Some(close) => bars.push(PriceBar::new(timestamp, close)),
            None => warn!(
                "⚠️ Skipping {} bar at {} without close for {}",
                granularity, stamp, symbol
            ),
        }
    }

    bars.sort_by_key(|bar| bar.timestamp);
    Ok(bars)
}

fn parse_bar_timestamp(stamp: &str, granularity: Granularity) -> Option<NaiveDateTime> {
    if granularity.is_intraday() {
        NaiveDateTime::parse_from_str(stamp, INTRADAY_TIMESTAMP_FORMAT).ok()
    } else {
        NaiveDate::parse_from_str(stamp, DAILY_TIMESTAMP_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(MARKET_CLOSE_HOUR, 0, 0))
    }
}
