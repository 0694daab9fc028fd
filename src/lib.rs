//! Stockflow - periodic market data collection with money-flow tracking
//!
//! Samples 5-minute OHLCV candles for a tracked symbol set, persists each
//! sample exactly once, and derives a cumulative per-symbol, per-day net
//! money flow indicator at insert time.

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod market;
pub mod models;
pub mod scheduler;
pub mod symbols;

pub use config::{AppConfig, MarketConfig, SchedulerConfig, SourceConfig};
pub use db::CandleStore;
pub use error::{AppError, Result};
pub use fetch::{CandleSource, YahooSource};
pub use market::MarketCalendar;
pub use models::{Candle, FetchResult, MarketStatus, SchedulerStatus, StoredSample, StoreStats};
pub use scheduler::DataScheduler;
pub use symbols::SymbolSet;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging, wire the components and run the collector until the
/// process is killed.
///
/// Opening the store is the only fatal failure; everything after that is
/// logged and retried on a later cycle.
pub fn run(config: AppConfig) -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting stockflow...");

    let store = Arc::new(CandleStore::open(&config.database_path)?);
    let source = Arc::new(YahooSource::new(config.source));
    let calendar = MarketCalendar::new(config.market);

    let scheduler = DataScheduler::new(store, source, calendar, config.symbols, config.scheduler);
    scheduler.start(true);

    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
        let status = scheduler.status();
        tracing::info!(
            "{} | fetches: {} | errors: {} | records: {}",
            status.market_status,
            status.fetch_count,
            status.error_count,
            status.total_records
        );
    }
}
