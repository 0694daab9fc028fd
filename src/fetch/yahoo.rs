//! Yahoo Finance chart API source

use crate::config::SourceConfig;
use crate::error::{AppError, Result};
use crate::fetch::CandleSource;
use crate::models::Candle;
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API client
pub struct YahooSource {
    cfg: SourceConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    symbol: String,
    #[serde(rename = "exchangeTimezoneName")]
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<i64>>>,
}

fn column<T: Copy>(values: &Option<Vec<Option<T>>>, idx: usize) -> Option<T> {
    values.as_ref().and_then(|v| v.get(idx)).copied().flatten()
}

impl YahooSource {
    pub fn new(cfg: SourceConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .user_agent("Mozilla/5.0 (compatible; stockflow/1.0)")
            .build()
            .expect("Failed to create HTTP client");

        Self { cfg, client }
    }

    /// Provider range parameter covering `days` days of intraday bars
    fn range_for_days(days: u32) -> &'static str {
        match days {
            0..=1 => "1d",
            2..=5 => "5d",
            6..=30 => "1mo",
            _ => "3mo",
        }
    }

    fn fetch_chart(&self, symbol: &str, range: &str) -> Result<ChartResult> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}&includePrePost=false",
            self.cfg.base_url, symbol, range, self.cfg.interval
        );
        debug!("Fetching chart for {} (range {})", symbol, range);

        let response: ChartResponse = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .json()?;

        if let Some(err) = response.chart.error {
            return Err(AppError::Fetch(format!("{}: {}", err.code, err.description)));
        }

        match response.chart.result {
            Some(mut results) if !results.is_empty() => Ok(results.remove(0)),
            _ => Err(AppError::Fetch(format!("No data returned for {}", symbol))),
        }
    }

    fn bar_timezone(&self, meta: &ChartMeta) -> Tz {
        meta.exchange_timezone_name
            .as_deref()
            .and_then(|name| Tz::from_str(name).ok())
            .unwrap_or(self.cfg.timezone)
    }

    /// Convert a chart payload to candles, dropping bars the provider pads
    /// with nulls (the still-forming tail of the current day).
    fn candles_from(&self, symbol: &str, chart: &ChartResult) -> Vec<Candle> {
        let timestamps = match &chart.timestamp {
            Some(ts) => ts,
            None => return Vec::new(),
        };
        let quote = match chart.indicators.quote.first() {
            Some(q) => q,
            None => return Vec::new(),
        };
        let tz = self.bar_timezone(&chart.meta);

        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, &epoch) in timestamps.iter().enumerate() {
            let (open, high, low, close) = match (
                column(&quote.open, i),
                column(&quote.high, i),
                column(&quote.low, i),
                column(&quote.close, i),
            ) {
                (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
                _ => continue,
            };
            let volume = column(&quote.volume, i).unwrap_or(0);

            let timestamp = match Utc.timestamp_opt(epoch, 0).single() {
                Some(t) => t.with_timezone(&tz).naive_local(),
                None => continue,
            };

            candles.push(Candle::new(symbol, timestamp, open, high, low, close, volume));
        }

        candles
    }
}

impl CandleSource for YahooSource {
    fn fetch_latest(&self, symbol: &str) -> Result<Candle> {
        let chart = self.fetch_chart(symbol, "1d")?;
        let mut candles = self.candles_from(symbol, &chart);

        match candles.pop() {
            Some(candle) => {
                debug!("Fetched {}: close {:.2}", symbol, candle.close);
                Ok(candle)
            }
            None => Err(AppError::Fetch(format!("No data returned for {}", symbol))),
        }
    }

    fn fetch_history(&self, symbol: &str, days: u32) -> Result<Vec<Candle>> {
        let chart = self.fetch_chart(symbol, Self::range_for_days(days))?;
        let candles = self.candles_from(symbol, &chart);
        debug!("Fetched {} historical bars for {}", candles.len(), symbol);
        Ok(candles)
    }

    fn validate(&self, symbol: &str) -> bool {
        match self.fetch_chart(symbol, "1d") {
            Ok(chart) => chart.meta.symbol.eq_ignore_ascii_case(symbol),
            Err(e) => {
                warn!("Symbol validation failed for {}: {}", symbol, e);
                false
            }
        }
    }
}
