use async_trait::async_trait;
use sqlx::PgPool;

use super::PositionRepo;
use crate::domain::Position;
use crate::error::Result;

/// Postgres-backed position repository. Adjustments are single upserts keyed
/// by `(client_id, ticker)`.
pub struct PgPositionRepo {
    pool: PgPool,
}

impl PgPositionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn adjust(&self, position: &Position, delta: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (client_id, ticker, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (client_id, ticker)
            DO UPDATE SET amount = positions.amount + EXCLUDED.amount
            "#,
        )
        .bind(position.client_id)
        .bind(&position.ticker)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    client_id: i64,
    ticker: String,
    amount: i32,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            client_id: row.client_id,
            ticker: row.ticker,
            amount: row.amount,
        }
    }
}

#[async_trait]
impl PositionRepo for PgPositionRepo {
    async fn add(&self, position: &Position) -> Result<()> {
        self.adjust(position, position.amount).await
    }

    async fn get(&self, client_id: i64) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT client_id, ticker, amount FROM positions WHERE client_id = $1 ORDER BY ticker",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Position::from).collect())
    }

    async fn remove(&self, position: &Position) -> Result<()> {
        self.adjust(position, -position.amount).await
    }
}
