use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{StatisticRepo, HISTORY_LIMIT};
use crate::domain::Ohlcv;
use crate::error::Result;

/// Postgres-backed candle store. Candles accumulate unbounded; there is no
/// retention policy.
pub struct PgStatisticRepo {
    pool: PgPool,
}

impl PgStatisticRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CandleRow {
    id: i64,
    ticker: String,
    time: DateTime<Utc>,
    interval_secs: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i32,
}

impl From<CandleRow> for Ohlcv {
    fn from(row: CandleRow) -> Self {
        Ohlcv {
            id: row.id,
            ticker: row.ticker,
            time: row.time,
            interval: Duration::from_secs(row.interval_secs.max(0) as u64),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

#[async_trait]
impl StatisticRepo for PgStatisticRepo {
    async fn add(&self, candle: &Ohlcv) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candles (id, ticker, time, interval_secs, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(candle.id)
        .bind(&candle.ticker)
        .bind(candle.time)
        .bind(candle.interval.as_secs() as i64)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, ticker: &str) -> Result<Vec<Ohlcv>> {
        let rows = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT id, ticker, time, interval_secs, open, high, low, close, volume
            FROM candles
            WHERE ticker = $1
            ORDER BY time DESC
            LIMIT $2
            "#,
        )
        .bind(ticker)
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Ohlcv::from).collect())
    }
}
