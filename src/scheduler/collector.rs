//! Data collection scheduler
//!
//! Owns the run/stop lifecycle and a background worker thread that drives
//! two due-times cooperatively: a recurring collection every
//! `fetch_interval` and a daily maintenance run at `maintenance_time`.
//! Due-checks happen once per tick; timers never block each other.
//!
//! There is no per-fetch deadline: a slow provider stretches the whole
//! cycle, and the next collection simply fires late.

use crate::config::SchedulerConfig;
use crate::db::CandleStore;
use crate::fetch::CandleSource;
use crate::market::MarketCalendar;
use crate::models::{FetchResult, SchedulerStatus};
use crate::symbols::SymbolSet;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Manages background data collection on a schedule
pub struct DataScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    store: Arc<CandleStore>,
    source: Arc<dyn CandleSource>,
    calendar: MarketCalendar,
    symbols: SymbolSet,
    cfg: SchedulerConfig,
    running: AtomicBool,
    market_hours_only: AtomicBool,
    fetch_count: AtomicU64,
    error_count: AtomicU64,
    // Written by both the worker and the manual collection path
    last_fetch_time: Mutex<Option<NaiveDateTime>>,
    next_collection_time: Mutex<Option<NaiveDateTime>>,
}

impl DataScheduler {
    pub fn new(
        store: Arc<CandleStore>,
        source: Arc<dyn CandleSource>,
        calendar: MarketCalendar,
        symbols: Vec<String>,
        cfg: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                calendar,
                symbols: SymbolSet::new(symbols),
                cfg,
                running: AtomicBool::new(false),
                market_hours_only: AtomicBool::new(true),
                fetch_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                last_fetch_time: Mutex::new(None),
                next_collection_time: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the background worker. A second start while running is a
    /// no-op with a warning.
    pub fn start(&self, market_hours_only: bool) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler is already running");
            return;
        }

        self.inner
            .market_hours_only
            .store(market_hours_only, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || inner.run_worker());
        *self.worker.lock() = Some(handle);

        info!("Data scheduler started (market hours only: {})", market_hours_only);
    }

    /// Request the worker to exit and wait up to `stop_timeout` for it.
    /// Idempotent; a worker that does not exit in time is detached.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.worker.lock().take() {
            let deadline = Instant::now() + self.inner.cfg.stop_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(50));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(
                    "Worker did not exit within {:?}, detaching",
                    self.inner.cfg.stop_timeout
                );
            }
        }

        *self.inner.next_collection_time.lock() = None;
        info!("Data scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Trigger a collection immediately, whether or not the worker is
    /// running. `force` bypasses the market-hours gate.
    pub fn collect_now(&self, force: bool) -> Vec<FetchResult> {
        self.inner.collect(force)
    }

    /// Backfill historical data for one symbol; returns newly written rows
    /// (duplicates are excluded from the count). Not gated by market hours.
    pub fn backfill(&self, symbol: &str, days: u32) -> usize {
        self.inner.backfill(symbol, days)
    }

    /// Backfill every tracked symbol, pausing between symbols to bound
    /// burst load on the provider. Returns the summed count of new rows.
    pub fn backfill_all(&self, days: u32) -> usize {
        let symbols = self.inner.symbols.list();
        let mut total = 0;

        for (i, symbol) in symbols.iter().enumerate() {
            total += self.inner.backfill(symbol, days);
            if i + 1 < symbols.len() {
                thread::sleep(self.inner.cfg.backfill_pause);
            }
        }

        info!("Backfill completed: {} total new records", total);
        total
    }

    /// Add a symbol to tracking after validating it against the provider.
    /// A symbol that is already tracked is a success no-op.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        let normalized = SymbolSet::normalize(symbol);
        if normalized.is_empty() {
            return false;
        }

        if self.inner.symbols.contains(&normalized) {
            info!("Symbol {} already being tracked", normalized);
            return true;
        }

        if self.inner.source.validate(&normalized) {
            self.inner.symbols.add(&normalized);
            info!("Added symbol {} to tracking list", normalized);
            true
        } else {
            warn!("Invalid symbol: {}", normalized);
            false
        }
    }

    /// Remove a symbol from tracking; false when it was not tracked
    pub fn remove_symbol(&self, symbol: &str) -> bool {
        if self.inner.symbols.remove(symbol) {
            info!("Removed symbol {} from tracking list", SymbolSet::normalize(symbol));
            true
        } else {
            warn!("Symbol {} not in tracking list", SymbolSet::normalize(symbol));
            false
        }
    }

    /// Currently tracked symbols in insertion order
    pub fn get_symbols(&self) -> Vec<String> {
        self.inner.symbols.list()
    }

    pub fn set_market_hours_only(&self, market_hours_only: bool) {
        self.inner
            .market_hours_only
            .store(market_hours_only, Ordering::SeqCst);
        info!("Market hours only mode: {}", market_hours_only);
    }

    /// Status snapshot; every field is computed fresh from its source of
    /// truth.
    pub fn status(&self) -> SchedulerStatus {
        let market_status = self.inner.calendar.status();
        let total_records = match self.inner.store.total_count() {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to read record count: {}", e);
                0
            }
        };

        SchedulerStatus {
            is_running: self.inner.running.load(Ordering::SeqCst),
            last_fetch_time: *self.inner.last_fetch_time.lock(),
            next_collection_time: *self.inner.next_collection_time.lock(),
            fetch_count: self.inner.fetch_count.load(Ordering::SeqCst),
            error_count: self.inner.error_count.load(Ordering::SeqCst),
            market_status,
            symbols_count: self.inner.symbols.len(),
            total_records,
            market_hours_only: self.inner.market_hours_only.load(Ordering::SeqCst),
        }
    }
}

impl Inner {
    /// Worker loop: short fixed tick, non-blocking due-checks for the two
    /// timers. Exits when the running flag clears.
    fn run_worker(self: Arc<Self>) {
        info!("Collection worker started");

        let mut next_collect = Instant::now() + self.cfg.fetch_interval;
        let mut next_maintenance = next_occurrence(self.calendar.now(), self.cfg.maintenance_time);
        self.publish_next_collection();

        while self.running.load(Ordering::SeqCst) {
            if Instant::now() >= next_collect {
                self.collect(false);
                next_collect = Instant::now() + self.cfg.fetch_interval;
                self.publish_next_collection();
            }

            if self.calendar.now() >= next_maintenance {
                self.run_maintenance();
                next_maintenance = next_occurrence(self.calendar.now(), self.cfg.maintenance_time);
            }

            thread::sleep(self.cfg.tick);
        }

        info!("Collection worker exited");
    }

    fn publish_next_collection(&self) {
        let interval = ChronoDuration::seconds(self.cfg.fetch_interval.as_secs() as i64);
        *self.next_collection_time.lock() = Some(self.calendar.now() + interval);
    }

    /// Collect the latest candle for every tracked symbol. Per-symbol
    /// failures are recorded and never abort the batch; the batch counters
    /// advance whenever the batch actually runs.
    fn collect(&self, force: bool) -> Vec<FetchResult> {
        let market_status = self.calendar.status();

        if self.market_hours_only.load(Ordering::SeqCst) && !market_status.is_open && !force {
            debug!("Market closed, skipping data collection. {}", market_status);
            return Vec::new();
        }

        info!("Starting data collection. {}", market_status);

        let symbols = self.symbols.list();
        let mut results = Vec::with_capacity(symbols.len());
        let mut saved = 0usize;

        for symbol in &symbols {
            match self.source.fetch_latest(symbol) {
                Ok(candle) => {
                    match self.store.insert(&candle) {
                        Ok(true) => saved += 1,
                        Ok(false) => {}
                        Err(e) => error!("Failed to store candle for {}: {}", symbol, e),
                    }
                    results.push(FetchResult::ok(symbol.clone(), candle));
                }
                Err(e) => {
                    self.error_count.fetch_add(1, Ordering::SeqCst);
                    warn!("Failed to fetch {}: {}", symbol, e);
                    results.push(FetchResult::failure(symbol.clone(), e.to_string()));
                }
            }
        }

        *self.last_fetch_time.lock() = Some(self.calendar.now());
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        info!("Completed data collection: {} new records saved", saved);
        results
    }

    fn backfill(&self, symbol: &str, days: u32) -> usize {
        let symbol = SymbolSet::normalize(symbol);
        info!("Backfilling {} days of data for {}", days, symbol);

        let candles = match self.source.fetch_history(&symbol, days) {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Error backfilling data for {}: {}", symbol, e);
                return 0;
            }
        };

        let mut saved = 0;
        for candle in &candles {
            match self.store.insert(candle) {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to store candle for {}: {}", symbol, e),
            }
        }

        info!("Backfilled {} new records for {}", saved, symbol);
        saved
    }

    /// Daily maintenance: purge beyond the retention window and reset the
    /// error counter. Errors are logged and never crash the worker.
    fn run_maintenance(&self) {
        info!("Starting daily maintenance");

        let cutoff = self.calendar.now() - ChronoDuration::days(self.cfg.retention_days);
        match self.store.purge_older_than(cutoff) {
            Ok(deleted) => {
                info!("Daily maintenance completed: {} old records removed", deleted)
            }
            Err(e) => error!("Error during daily maintenance: {}", e),
        }

        self.error_count.store(0, Ordering::SeqCst);
    }
}

/// Next occurrence of a daily local time at or after `now`
fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    if now.time() < at {
        now.date().and_time(at)
    } else {
        (now.date() + ChronoDuration::days(1)).and_time(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::error::AppError;
    use crate::models::Candle;
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct MockSource {
        latest: HashMap<String, Candle>,
        history: HashMap<String, Vec<Candle>>,
        valid: HashSet<String>,
    }

    impl CandleSource for MockSource {
        fn fetch_latest(&self, symbol: &str) -> crate::error::Result<Candle> {
            self.latest
                .get(symbol)
                .cloned()
                .ok_or_else(|| AppError::Fetch(format!("No data returned for {}", symbol)))
        }

        fn fetch_history(&self, symbol: &str, _days: u32) -> crate::error::Result<Vec<Candle>> {
            Ok(self.history.get(symbol).cloned().unwrap_or_default())
        }

        fn validate(&self, symbol: &str) -> bool {
            self.valid.contains(symbol)
        }
    }

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn sample_candle(symbol: &str, timestamp: NaiveDateTime) -> Candle {
        Candle::new(symbol, timestamp, 100.0, 104.0, 100.0, 102.0, 1_000_000)
    }

    fn always_open_calendar() -> MarketCalendar {
        MarketCalendar::new(MarketConfig {
            open: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
            timezone: chrono_tz::UTC,
        })
    }

    fn never_open_calendar() -> MarketCalendar {
        MarketCalendar::new(MarketConfig {
            trading_days: Vec::new(),
            ..MarketConfig::default()
        })
    }

    fn test_cfg() -> SchedulerConfig {
        SchedulerConfig {
            backfill_pause: Duration::ZERO,
            tick: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(2),
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(
        source: MockSource,
        calendar: MarketCalendar,
        symbols: &[&str],
        cfg: SchedulerConfig,
    ) -> DataScheduler {
        DataScheduler::new(
            Arc::new(CandleStore::in_memory().unwrap()),
            Arc::new(source),
            calendar,
            symbols.iter().map(|s| s.to_string()).collect(),
            cfg,
        )
    }

    #[test]
    fn partial_failure_reports_every_symbol() {
        let mut source = MockSource::default();
        source
            .latest
            .insert("AAPL".to_string(), sample_candle("AAPL", ts(8, 10, 0)));
        source
            .latest
            .insert("MSFT".to_string(), sample_candle("MSFT", ts(8, 10, 0)));

        let sched = scheduler(
            source,
            always_open_calendar(),
            &["AAPL", "MSFT", "FAIL"],
            test_cfg(),
        );
        let results = sched.collect_now(true);

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
        let failed = results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.symbol, "FAIL");
        assert!(failed.error.is_some());

        let status = sched.status();
        assert_eq!(status.error_count, 1);
        assert_eq!(status.fetch_count, 1);
        assert!(status.last_fetch_time.is_some());
        assert_eq!(status.total_records, 2);
    }

    #[test]
    fn collection_is_gated_when_market_closed() {
        let mut source = MockSource::default();
        source
            .latest
            .insert("AAPL".to_string(), sample_candle("AAPL", ts(8, 10, 0)));

        let sched = scheduler(source, never_open_calendar(), &["AAPL"], test_cfg());
        let results = sched.collect_now(false);

        assert!(results.is_empty());
        let status = sched.status();
        assert_eq!(status.fetch_count, 0);
        assert!(status.last_fetch_time.is_none());
        assert_eq!(status.total_records, 0);
    }

    #[test]
    fn forced_collection_bypasses_gating() {
        let mut source = MockSource::default();
        source
            .latest
            .insert("AAPL".to_string(), sample_candle("AAPL", ts(8, 10, 0)));

        let sched = scheduler(source, never_open_calendar(), &["AAPL"], test_cfg());
        let results = sched.collect_now(true);

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(sched.status().fetch_count, 1);
        assert_eq!(sched.status().total_records, 1);
    }

    #[test]
    fn repeated_collection_does_not_duplicate_rows() {
        let mut source = MockSource::default();
        source
            .latest
            .insert("AAPL".to_string(), sample_candle("AAPL", ts(8, 10, 0)));

        let sched = scheduler(source, always_open_calendar(), &["AAPL"], test_cfg());
        sched.collect_now(true);
        sched.collect_now(true);

        let status = sched.status();
        assert_eq!(status.fetch_count, 2);
        assert_eq!(status.total_records, 1);
    }

    #[test]
    fn backfill_counts_only_new_rows() {
        let mut source = MockSource::default();
        source.history.insert(
            "AAPL".to_string(),
            vec![
                sample_candle("AAPL", ts(8, 10, 0)),
                sample_candle("AAPL", ts(8, 10, 5)),
                sample_candle("AAPL", ts(8, 10, 10)),
            ],
        );

        let store = Arc::new(CandleStore::in_memory().unwrap());
        store.insert(&sample_candle("AAPL", ts(8, 10, 5))).unwrap();

        let sched = DataScheduler::new(
            Arc::clone(&store),
            Arc::new(source),
            always_open_calendar(),
            vec!["AAPL".to_string()],
            test_cfg(),
        );

        assert_eq!(sched.backfill("AAPL", 1), 2);
        assert_eq!(store.total_count().unwrap(), 3);
    }

    #[test]
    fn backfill_all_sums_per_symbol_counts() {
        let mut source = MockSource::default();
        source.history.insert(
            "AAPL".to_string(),
            vec![
                sample_candle("AAPL", ts(8, 10, 0)),
                sample_candle("AAPL", ts(8, 10, 5)),
            ],
        );
        source
            .history
            .insert("MSFT".to_string(), vec![sample_candle("MSFT", ts(8, 10, 0))]);

        let sched = scheduler(
            source,
            always_open_calendar(),
            &["AAPL", "MSFT"],
            test_cfg(),
        );
        assert_eq!(sched.backfill_all(1), 3);
    }

    #[test]
    fn add_symbol_validates_against_source() {
        let mut source = MockSource::default();
        source.valid.insert("NVDA".to_string());

        let sched = scheduler(source, always_open_calendar(), &["AAPL"], test_cfg());

        assert!(sched.add_symbol("nvda"));
        assert_eq!(sched.get_symbols(), vec!["AAPL", "NVDA"]);

        // Unknown symbol is rejected without state change
        assert!(!sched.add_symbol("BOGUS"));
        assert_eq!(sched.get_symbols(), vec!["AAPL", "NVDA"]);

        // Already tracked is a success no-op, even without validation
        assert!(sched.add_symbol("AAPL"));
        assert_eq!(sched.get_symbols().len(), 2);
    }

    #[test]
    fn remove_symbol_reports_absence() {
        let sched = scheduler(
            MockSource::default(),
            always_open_calendar(),
            &["AAPL"],
            test_cfg(),
        );

        assert!(sched.remove_symbol("aapl"));
        assert!(!sched.remove_symbol("AAPL"));
        assert!(sched.get_symbols().is_empty());
    }

    #[test]
    fn start_stop_lifecycle_is_idempotent() {
        let cfg = SchedulerConfig {
            // Long interval so the worker never collects during the test
            fetch_interval: Duration::from_secs(3600),
            ..test_cfg()
        };
        let sched = scheduler(MockSource::default(), always_open_calendar(), &[], cfg);

        assert!(!sched.is_running());
        sched.stop(); // stop while stopped is a no-op

        sched.start(true);
        assert!(sched.is_running());
        sched.start(true); // start while running is a warning no-op
        assert!(sched.is_running());

        sched.stop();
        assert!(!sched.is_running());
        sched.stop();
        assert!(!sched.is_running());
    }

    #[test]
    fn worker_collects_on_interval() {
        let mut source = MockSource::default();
        source
            .latest
            .insert("AAPL".to_string(), sample_candle("AAPL", ts(8, 10, 0)));

        let cfg = SchedulerConfig {
            fetch_interval: Duration::from_millis(50),
            ..test_cfg()
        };
        let sched = scheduler(source, always_open_calendar(), &["AAPL"], cfg);

        sched.start(false);
        thread::sleep(Duration::from_millis(400));
        sched.stop();

        let status = sched.status();
        assert!(status.fetch_count >= 1);
        assert_eq!(status.total_records, 1);
        assert!(status.last_fetch_time.is_some());
    }

    #[test]
    fn status_reflects_tracked_symbols_and_mode() {
        let sched = scheduler(
            MockSource::default(),
            always_open_calendar(),
            &["AAPL", "MSFT"],
            test_cfg(),
        );

        let status = sched.status();
        assert!(!status.is_running);
        assert_eq!(status.symbols_count, 2);
        assert!(status.market_hours_only);
        assert!(status.market_status.is_trading_day);

        sched.set_market_hours_only(false);
        assert!(!sched.status().market_hours_only);
    }
}
