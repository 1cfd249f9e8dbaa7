use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::DealRepo;
use crate::domain::{Deal, DealStatus};
use crate::error::Result;

/// Postgres-backed deal repository. The deal id is the one assigned by the
/// exchange, not a local sequence.
pub struct PgDealRepo {
    pool: PgPool,
}

impl PgDealRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DealRow {
    id: i64,
    client_id: i64,
    ticker: String,
    deal_type: String,
    amount: i32,
    partial: bool,
    price: f64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DealRow> for Deal {
    type Error = crate::error::BrokerError;

    fn try_from(row: DealRow) -> Result<Self> {
        Ok(Deal {
            id: row.id,
            client_id: row.client_id,
            ticker: row.ticker,
            deal_type: row.deal_type.parse()?,
            amount: row.amount,
            partial: row.partial,
            price: row.price,
            status: row.status.parse()?,
            time: row.created_at,
        })
    }
}

#[async_trait]
impl DealRepo for PgDealRepo {
    async fn add(&self, deal: &Deal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deals (id, client_id, ticker, deal_type, amount, partial, price, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(deal.id)
        .bind(deal.client_id)
        .bind(&deal.ticker)
        .bind(deal.deal_type.as_str())
        .bind(deal.amount)
        .bind(deal.partial)
        .bind(deal.price)
        .bind(deal.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_opened(&self, client_id: i64) -> Result<Vec<Deal>> {
        let rows = sqlx::query_as::<_, DealRow>(
            r#"
            SELECT id, client_id, ticker, deal_type, amount, partial, price, status, created_at
            FROM deals
            WHERE client_id = $1 AND status = $2
            ORDER BY created_at
            "#,
        )
        .bind(client_id)
        .bind(DealStatus::New.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Deal::try_from).collect()
    }

    async fn update(&self, deal: &Deal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deals
            SET amount = $1, partial = $2, price = $3, status = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(deal.amount)
        .bind(deal.partial)
        .bind(deal.price)
        .bind(deal.status.as_str())
        .bind(deal.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, deal_id: i64, status: DealStatus) -> Result<()> {
        sqlx::query("UPDATE deals SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(deal_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
