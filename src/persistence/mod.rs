//! Trade persistence.
//!
//! - `trade_log`: append-only CSV trade log, one row per fill
//! - [`TradeStore`]: SQLite journal of the same records, queried by `status`

mod trade_log;

pub use trade_log::{CsvTradeLog, TradeRecord, CSV_HEADER};

use crate::exchange::OrderSide;
use crate::strategy::{EventKind, StrategyEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed trade journal.
pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    /// Open (or create) the journal, initializing the schema if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Trade store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                connector TEXT NOT NULL,
                order_id TEXT NOT NULL,
                side TEXT NOT NULL,
                size_usd TEXT NOT NULL,
                price TEXT NOT NULL,
                fee TEXT NOT NULL,
                spread TEXT NOT NULL,
                mid_a TEXT NOT NULL,
                mid_b TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
            CREATE INDEX IF NOT EXISTS idx_trades_connector ON trades(connector);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Record every fill of an event in one transaction.
    pub fn record_event(&self, event: &StrategyEvent) -> Result<usize> {
        let records = TradeRecord::from_event(event);
        let tx = self.conn.unchecked_transaction()?;

        for record in &records {
            tx.execute(
                r#"
                INSERT INTO trades (timestamp, type, connector, order_id, side, size_usd,
                                    price, fee, spread, mid_a, mid_b)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    record.timestamp.to_rfc3339(),
                    record.kind.as_str(),
                    record.connector,
                    record.order_id,
                    record.side.as_str(),
                    record.size_usd.to_string(),
                    record.price.to_string(),
                    record.fee.to_string(),
                    record.spread.to_string(),
                    record.mid_a.to_string(),
                    record.mid_b.to_string(),
                ],
            )?;
        }

        tx.commit()?;
        debug!(kind = %event.kind, rows = records.len(), "Trades recorded");
        Ok(records.len())
    }

    pub fn trade_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Total fees per connector.
    pub fn fees_by_venue(&self) -> Result<HashMap<String, Decimal>> {
        let mut stmt = self.conn.prepare("SELECT connector, fee FROM trades")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut fees: HashMap<String, Decimal> = HashMap::new();
        for row in rows {
            let (connector, fee) = row?;
            let fee = Decimal::from_str(&fee)
                .with_context(|| format!("Corrupt fee value in trades table: {fee}"))?;
            *fees.entry(connector).or_default() += fee;
        }

        Ok(fees)
    }

    /// Most recent trades, newest first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, type, connector, order_id, side, size_usd,
                   price, fee, spread, mid_a, mid_b
            FROM trades ORDER BY id DESC LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let mut cols = Vec::with_capacity(11);
            for i in 0..11 {
                cols.push(row.get::<_, String>(i)?);
            }
            Ok(cols)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(parse_record(&row?)?);
        }

        Ok(records)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM trades", [])?;
        info!("Cleared all trade records");
        Ok(())
    }
}

fn parse_record(cols: &[String]) -> Result<TradeRecord> {
    let decimal = |i: usize| {
        Decimal::from_str(&cols[i]).with_context(|| format!("Corrupt decimal value: {}", cols[i]))
    };

    Ok(TradeRecord {
        timestamp: DateTime::parse_from_rfc3339(&cols[0])
            .with_context(|| format!("Corrupt timestamp: {}", cols[0]))?
            .with_timezone(&Utc),
        kind: match cols[1].as_str() {
            "open" => EventKind::Open,
            "close" => EventKind::Close,
            other => anyhow::bail!("Unknown trade type: {other}"),
        },
        connector: cols[2].clone(),
        order_id: cols[3].clone(),
        side: match cols[4].as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => anyhow::bail!("Unknown order side: {other}"),
        },
        size_usd: decimal(5)?,
        price: decimal(6)?,
        fee: decimal(7)?,
        spread: decimal(8)?,
        mid_a: decimal(9)?,
        mid_b: decimal(10)?,
    })
}
