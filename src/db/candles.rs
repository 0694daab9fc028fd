//! Candle table operations
//!
//! Inserts compute the derived money-flow columns from prior same-day state
//! inside the insert transaction, so the read-then-write sequence is atomic
//! with respect to other writers of the same symbol and day.

use crate::error::Result;
use crate::models::{Candle, StoredSample, StoreStats};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn encode_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn decode_ts(raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Derive the integer-scaled avg price and money flow for a candle.
///
/// Volume is integer-divided by 1000 (truncating) before money flow is
/// computed, and both outputs are rounded to integers. This scaling is the
/// stored-data convention; keep it unchanged so new rows stay comparable
/// with rows written by earlier versions.
fn derive_flow(candle: &Candle) -> (i64, i64) {
    let avg_price = ((candle.high + candle.low) / 2.0).round() as i64;
    let scaled_volume = candle.volume / 1000;
    let money_flow = (avg_price as f64 * scaled_volume as f64 / 1000.0).round() as i64;
    (avg_price, money_flow)
}

/// Insert a candle with its derived money-flow columns.
///
/// Returns true when a new row was written, false when the
/// (symbol, timestamp) pair already exists (the duplicate is ignored and the
/// stored row is left unchanged).
pub fn insert_candle(conn: &mut Connection, candle: &Candle) -> Result<bool> {
    let tx = conn.transaction()?;
    let (avg_price, money_flow) = derive_flow(candle);
    let day = candle.timestamp.date().format("%Y-%m-%d").to_string();

    // Most recent prior row for the same symbol and calendar day
    let prev: Option<(i64, i64)> = match tx.query_row(
        "SELECT avg_price, net_money_flow FROM candles
         WHERE symbol = ?1 AND date(timestamp) = ?2 AND timestamp < ?3
         ORDER BY timestamp DESC
         LIMIT 1",
        params![candle.symbol, day, encode_ts(&candle.timestamp)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ) {
        Ok(pair) => Some(pair),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };

    let net_money_flow = match prev {
        // First entry of the day: sign follows the candle's own direction
        None => {
            if candle.close < candle.open {
                -money_flow
            } else {
                money_flow
            }
        }
        Some((prev_avg, prev_nmf)) => {
            if avg_price > prev_avg {
                money_flow + prev_nmf
            } else if avg_price < prev_avg {
                -money_flow + prev_nmf
            } else if prev_nmf >= 0 {
                // Equal avg prices inherit the prior sign
                money_flow + prev_nmf
            } else {
                -money_flow + prev_nmf
            }
        }
    };

    let rows = tx.execute(
        "INSERT OR IGNORE INTO candles
         (symbol, timestamp, open, high, low, close, volume,
          avg_price, money_flow, net_money_flow, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            candle.symbol,
            encode_ts(&candle.timestamp),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume,
            avg_price,
            money_flow,
            net_money_flow,
            encode_ts(&candle.created_at),
        ],
    )?;
    tx.commit()?;

    if rows > 0 {
        tracing::debug!("Saved candle: {}", candle);
    } else {
        tracing::debug!("Candle already exists: {} {}", candle.symbol, candle.timestamp);
    }

    Ok(rows > 0)
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSample> {
    let timestamp: String = row.get(1)?;
    let created_at: String = row.get(10)?;
    Ok(StoredSample {
        symbol: row.get(0)?,
        timestamp: decode_ts(&timestamp)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
        avg_price: row.get(7)?,
        money_flow: row.get(8)?,
        net_money_flow: row.get(9)?,
        created_at: decode_ts(&created_at)?,
    })
}

const SAMPLE_COLUMNS: &str = "symbol, timestamp, open, high, low, close, volume, \
                              avg_price, money_flow, net_money_flow, created_at";

/// Latest stored sample for a symbol
pub fn latest(conn: &Connection, symbol: &str) -> Result<Option<StoredSample>> {
    let result = conn.query_row(
        &format!(
            "SELECT {SAMPLE_COLUMNS} FROM candles
             WHERE symbol = ?1
             ORDER BY timestamp DESC
             LIMIT 1"
        ),
        params![symbol],
        sample_from_row,
    );

    match result {
        Ok(sample) => Ok(Some(sample)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Recent stored samples for a symbol, most recent first
pub fn range(conn: &Connection, symbol: &str, limit: usize) -> Result<Vec<StoredSample>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM candles
         WHERE symbol = ?1
         ORDER BY timestamp DESC
         LIMIT ?2"
    ))?;

    let samples = stmt
        .query_map(params![symbol, limit as i64], sample_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(samples)
}

/// All symbols present in the table, sorted
pub fn distinct_symbols(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM candles ORDER BY symbol")?;
    let symbols = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(symbols)
}

/// Total number of stored samples
pub fn total_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM candles", [], |row| row.get(0))?;
    Ok(count)
}

/// Hard-delete samples older than the cutoff; returns the deleted count
pub fn purge_older_than(conn: &Connection, cutoff: NaiveDateTime) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM candles WHERE timestamp < ?1",
        params![encode_ts(&cutoff)],
    )?;

    tracing::info!("Purged {} records older than {}", deleted, cutoff);
    Ok(deleted)
}

/// Table statistics; `db_size_bytes` is supplied by the store wrapper
pub fn stats(conn: &Connection, db_size_bytes: u64) -> Result<StoreStats> {
    let total_records = total_count(conn)?;

    let mut stmt = conn.prepare(
        "SELECT symbol, COUNT(*) FROM candles
         GROUP BY symbol
         ORDER BY COUNT(*) DESC",
    )?;
    let symbol_counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<(String, i64)>, _>>()?;

    let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(timestamp), MAX(timestamp) FROM candles",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(StoreStats {
        total_records,
        symbol_counts,
        earliest: earliest.as_deref().map(decode_ts).transpose()?,
        latest: latest.as_deref().map(decode_ts).transpose()?,
        db_size_bytes,
    })
}
