//! Candle retrieval
//!
//! The scheduler consumes market data through the `CandleSource` seam; the
//! Yahoo Finance implementation lives in `yahoo`. Providers do not retry:
//! a failed fetch simply waits for the next scheduled cycle.

mod yahoo;

pub use yahoo::YahooSource;

use crate::error::Result;
use crate::models::Candle;

/// External market-data provider
pub trait CandleSource: Send + Sync {
    /// Latest bar for a symbol; an empty provider response is a fetch error
    fn fetch_latest(&self, symbol: &str) -> Result<Candle>;

    /// Historical bars covering roughly the last `days` days; may be empty
    fn fetch_history(&self, symbol: &str, days: u32) -> Result<Vec<Candle>>;

    /// Whether the provider recognizes the symbol
    fn validate(&self, symbol: &str) -> bool;
}
