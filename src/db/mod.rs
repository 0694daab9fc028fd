//! Candle persistence
//!
//! `CandleStore` wraps a single SQLite connection behind a mutex; together
//! with the per-insert transaction in `candles`, this serializes every
//! read-then-write money-flow derivation against all other writers.

pub mod candles;
mod migrations;

use crate::error::Result;
use crate::models::{Candle, StoredSample, StoreStats};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Durable store of candles and their derived money-flow columns
pub struct CandleStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl CandleStore {
    /// Open (or create) the store at `path` and run migrations.
    ///
    /// This is the one failure that aborts startup; everything else in the
    /// store is recoverable at the call site.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.run_migrations()?;

        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    /// Insert a candle, deriving avg price, money flow and net money flow
    /// from prior same-day state. Returns false for a duplicate
    /// (symbol, timestamp) pair, which is silently ignored.
    pub fn insert(&self, candle: &Candle) -> Result<bool> {
        let mut conn = self.conn.lock();
        candles::insert_candle(&mut conn, candle)
    }

    /// Latest stored sample for a symbol
    pub fn latest(&self, symbol: &str) -> Result<Option<StoredSample>> {
        let conn = self.conn.lock();
        candles::latest(&conn, symbol)
    }

    /// Recent samples for a symbol, most recent first, bounded by `limit`
    pub fn range(&self, symbol: &str, limit: usize) -> Result<Vec<StoredSample>> {
        let conn = self.conn.lock();
        candles::range(&conn, symbol, limit)
    }

    /// All symbols present in the store
    pub fn distinct_symbols(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        candles::distinct_symbols(&conn)
    }

    /// Total number of stored samples
    pub fn total_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        candles::total_count(&conn)
    }

    /// Hard-delete samples older than the cutoff; returns the deleted count
    pub fn purge_older_than(&self, cutoff: NaiveDateTime) -> Result<usize> {
        let conn = self.conn.lock();
        candles::purge_older_than(&conn, cutoff)
    }

    /// Store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        candles::stats(&conn, self.file_size())
    }

    fn file_size(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }
}
