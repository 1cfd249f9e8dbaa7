//! Durable storage for clients, deals, positions and candles.
//!
//! The traits are the seams the broker service is written against; the
//! Postgres implementations live in the sibling modules. The schema is
//! bootstrapped on connect, no external migration tool.

mod client;
mod deal;
mod position;
mod statistic;

pub use client::PgClientRepo;
pub use deal::PgDealRepo;
pub use position::PgPositionRepo;
pub use statistic::PgStatisticRepo;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::domain::{Client, Deal, DealStatus, Ohlcv, Position};
use crate::error::Result;

/// History queries return at most this many candles.
pub const HISTORY_LIMIT: i64 = 300;

#[async_trait]
pub trait ClientRepo: Send + Sync {
    /// Inserts the client and fills in the generated id.
    async fn add(&self, client: &mut Client) -> Result<()>;

    async fn get(&self, login: &str) -> Result<Option<Client>>;

    /// Credits the balance by `amount`.
    async fn sum_balance(&self, client_id: i64, amount: f64) -> Result<()>;

    /// Debits the balance by `amount`.
    async fn sub_balance(&self, client_id: i64, amount: f64) -> Result<()>;
}

#[async_trait]
pub trait DealRepo: Send + Sync {
    async fn add(&self, deal: &Deal) -> Result<()>;

    /// Deals still waiting on the exchange (status New).
    async fn get_opened(&self, client_id: i64) -> Result<Vec<Deal>>;

    /// Applies the fill outcome: amount, partial flag, price and status.
    async fn update(&self, deal: &Deal) -> Result<()>;

    async fn update_status(&self, deal_id: i64, status: DealStatus) -> Result<()>;
}

#[async_trait]
pub trait PositionRepo: Send + Sync {
    /// Adds `amount` to the client's position on the ticker, creating it on
    /// first touch.
    async fn add(&self, position: &Position) -> Result<()>;

    async fn get(&self, client_id: i64) -> Result<Vec<Position>>;

    /// Subtracts `amount` from the client's position on the ticker.
    async fn remove(&self, position: &Position) -> Result<()>;
}

#[async_trait]
pub trait StatisticRepo: Send + Sync {
    async fn add(&self, candle: &Ohlcv) -> Result<()>;

    /// Most recent candles for `ticker`, newest first, capped at
    /// [`HISTORY_LIMIT`].
    async fn get(&self, ticker: &str) -> Result<Vec<Ohlcv>>;
}

/// Connects to Postgres and bootstraps the schema.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;

    initialize_schema(&pool).await?;
    info!("database initialized");

    Ok(pool)
}

async fn initialize_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            id BIGSERIAL PRIMARY KEY,
            login TEXT NOT NULL UNIQUE,
            balance DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deals (
            id BIGINT PRIMARY KEY,
            client_id BIGINT NOT NULL,
            ticker TEXT NOT NULL,
            deal_type TEXT NOT NULL,
            amount INTEGER NOT NULL,
            partial BOOLEAN NOT NULL DEFAULT FALSE,
            price DOUBLE PRECISION NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id BIGSERIAL PRIMARY KEY,
            client_id BIGINT NOT NULL,
            ticker TEXT NOT NULL,
            amount INTEGER NOT NULL DEFAULT 0,
            UNIQUE (client_id, ticker)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candles (
            id BIGINT PRIMARY KEY,
            ticker TEXT NOT NULL,
            time TIMESTAMPTZ NOT NULL,
            interval_secs BIGINT NOT NULL,
            open DOUBLE PRECISION NOT NULL,
            high DOUBLE PRECISION NOT NULL,
            low DOUBLE PRECISION NOT NULL,
            close DOUBLE PRECISION NOT NULL,
            volume INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS candles_ticker_time ON candles (ticker, time DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
