//! Component configuration
//!
//! Each component takes the slice of configuration it needs at construction;
//! there is no process-wide settings singleton.

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

/// Trading calendar configuration: open/close window, trading weekdays
/// and the exchange timezone all market-clock decisions are made in.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub trading_days: Vec<Weekday>,
    pub timezone: Tz,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            timezone: chrono_tz::America::New_York,
        }
    }
}

/// Scheduler timing configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scheduled collections
    pub fetch_interval: Duration,
    /// Local time of the daily maintenance run
    pub maintenance_time: NaiveTime,
    /// Samples older than this many days are purged at maintenance
    pub retention_days: i64,
    /// Pause between symbols during a bulk backfill
    pub backfill_pause: Duration,
    /// How long `stop()` waits for the worker before detaching
    pub stop_timeout: Duration,
    /// Worker loop tick; due-checks happen once per tick
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(5 * 60),
            maintenance_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            retention_days: 30,
            backfill_pause: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
            tick: Duration::from_secs(1),
        }
    }
}

/// Candle provider configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    /// Provider bar interval, e.g. "5m"
    pub interval: String,
    /// Fallback timezone for bar timestamps when the provider omits one
    pub timezone: Tz,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            interval: "5m".to_string(),
            timezone: chrono_tz::America::New_York,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Symbols tracked at startup
    pub symbols: Vec<String>,
    pub market: MarketConfig,
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/stockflow.db"),
            symbols: ["AAPL", "GOOGL", "MSFT", "TSLA", "AMZN", "NVDA", "META"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            market: MarketConfig::default(),
            scheduler: SchedulerConfig::default(),
            source: SourceConfig::default(),
        }
    }
}
