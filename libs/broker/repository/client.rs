use async_trait::async_trait;
use sqlx::PgPool;

use super::ClientRepo;
use crate::domain::Client;
use crate::error::Result;

/// Postgres-backed client repository.
pub struct PgClientRepo {
    pool: PgPool,
}

impl PgClientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: i64,
    login: String,
    balance: f64,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            login: row.login,
            balance: row.balance,
        }
    }
}

#[async_trait]
impl ClientRepo for PgClientRepo {
    async fn add(&self, client: &mut Client) -> Result<()> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO clients (login, balance) VALUES ($1, $2) RETURNING id")
                .bind(&client.login)
                .bind(client.balance)
                .fetch_one(&self.pool)
                .await?;
        client.id = id;

        Ok(())
    }

    async fn get(&self, login: &str) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, login, balance FROM clients WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn sum_balance(&self, client_id: i64, amount: f64) -> Result<()> {
        sqlx::query("UPDATE clients SET balance = balance + $1, updated_at = NOW() WHERE id = $2")
            .bind(amount)
            .bind(client_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn sub_balance(&self, client_id: i64, amount: f64) -> Result<()> {
        sqlx::query("UPDATE clients SET balance = balance - $1, updated_at = NOW() WHERE id = $2")
            .bind(amount)
            .bind(client_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
