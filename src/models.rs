//! Core data models

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One 5-minute OHLCV sample for one symbol. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    /// Insertion wall-clock time, set once at construction
    pub created_at: NaiveDateTime,
}

impl Candle {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            created_at: Utc::now().naive_utc(),
        }
    }
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: O:{:.2} H:{:.2} L:{:.2} C:{:.2} V:{}",
            self.symbol, self.timestamp, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

/// A persisted candle plus the derived money-flow columns.
///
/// The derived fields use the store's integer scaling convention: volume is
/// integer-divided by 1000 before money flow is computed, and avg price,
/// money flow and net money flow are all rounded to integers. See
/// `db::candles` for the derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSample {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub avg_price: i64,
    pub money_flow: i64,
    pub net_money_flow: i64,
    pub created_at: NaiveDateTime,
}

/// Current market status, recomputed on every query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatus {
    pub is_open: bool,
    pub is_trading_day: bool,
    pub current_time: NaiveDateTime,
    pub next_open: NaiveDateTime,
    /// Today's close; absent while the market is closed
    pub next_close: Option<NaiveDateTime>,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.is_open { "OPEN" } else { "CLOSED" };
        write!(f, "Market: {} at {}", status, self.current_time)
    }
}

/// Outcome of one symbol fetch: success flag plus payload or message,
/// never an error crossing the component boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub symbol: String,
    pub candle: Option<Candle>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn ok(symbol: impl Into<String>, candle: Candle) -> Self {
        Self {
            success: true,
            symbol: symbol.into(),
            candle: Some(candle),
            error: None,
        }
    }

    pub fn failure(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            symbol: symbol.into(),
            candle: None,
            error: Some(message.into()),
        }
    }
}

/// Scheduler status snapshot; every field is computed fresh at query time
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub last_fetch_time: Option<NaiveDateTime>,
    pub next_collection_time: Option<NaiveDateTime>,
    pub fetch_count: u64,
    pub error_count: u64,
    pub market_status: MarketStatus,
    pub symbols_count: usize,
    pub total_records: i64,
    pub market_hours_only: bool,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_records: i64,
    /// Per-symbol record counts, highest first
    pub symbol_counts: Vec<(String, i64)>,
    pub earliest: Option<NaiveDateTime>,
    pub latest: Option<NaiveDateTime>,
    pub db_size_bytes: u64,
}
