//! Market calendar
//!
//! Pure wall-clock-to-market-status evaluation for a configured open/close
//! window, trading-weekday set and exchange timezone. Nothing here touches
//! storage; status is recomputed on every query.

use crate::config::MarketConfig;
use crate::models::MarketStatus;
use chrono::{Datelike, Duration, NaiveDateTime, Utc};

/// Evaluates market status against a fixed trading calendar
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    cfg: MarketConfig,
}

impl MarketCalendar {
    pub fn new(cfg: MarketConfig) -> Self {
        Self { cfg }
    }

    /// Current time on the exchange clock
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.cfg.timezone).naive_local()
    }

    /// Market status at the current wall clock
    pub fn status(&self) -> MarketStatus {
        self.status_at(self.now())
    }

    /// Market status at a given exchange-local instant
    pub fn status_at(&self, now: NaiveDateTime) -> MarketStatus {
        let is_trading_day = self.cfg.trading_days.contains(&now.weekday());
        let time = now.time();
        let is_open = is_trading_day && self.cfg.open <= time && time <= self.cfg.close;

        let next_close = if is_open {
            Some(now.date().and_time(self.cfg.close))
        } else {
            None
        };

        MarketStatus {
            is_open,
            is_trading_day,
            current_time: now,
            next_open: self.next_open_after(now),
            next_close,
        }
    }

    /// Next market open at or after `now`. On a trading day before close this
    /// is today's open, even when the market is already open.
    fn next_open_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let mut date = now.date();
        if now.time() > self.cfg.close {
            date = date + Duration::days(1);
        }
        while !self.cfg.trading_days.contains(&date.weekday()) {
            date = date + Duration::days(1);
        }
        date.and_time(self.cfg.open)
    }
}
