//! Postgres-backed outbox store.
//!
//! Rows live in `scheduler_outbox` (see `migrations/`). Appends run on the
//! caller's `sqlx::Transaction`; peeks and deletes run on the pool, each in
//! its own implicit transaction.
//!
//! ## Error Mapping
//!
//! | SQLx Error | OutboxStoreError |
//! |------------|------------------|
//! | Database (any code) | `Database` |
//! | PoolClosed / PoolTimedOut / Io / Tls | `Unavailable` |
//! | Other | `Database` |

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use outpost_core::OutboxMessageId;
use outpost_intents::{NewOutboxMessage, OutboxMessage};

use super::store::{OutboxStore, OutboxStoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_create_scheduler_outbox.sql");

/// Postgres outbox store.
///
/// `Send + Sync` and cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, OutboxStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the outbox table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), OutboxStoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Begin a business transaction that outbox appends can join.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, OutboxStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    /// Number of committed rows waiting to be drained.
    pub async fn len(&self) -> Result<u64, OutboxStoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM scheduler_outbox")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    type Tx = Transaction<'static, Postgres>;

    #[instrument(skip(self, tx, message), fields(message_type = %message.message_type), err)]
    async fn append(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        message: NewOutboxMessage,
    ) -> Result<OutboxMessageId, OutboxStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO scheduler_outbox (type, data)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&message.message_type)
        .bind(&message.data)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("append", e))?;
        Ok(OutboxMessageId::new(id))
    }

    #[instrument(skip(self), err)]
    async fn peek_oldest(&self) -> Result<Option<OutboxMessage>, OutboxStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, type, data
            FROM scheduler_outbox
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("peek_oldest", e))?;

        match row {
            Some(row) => {
                let row = OutboxRow::from_row(&row).map_err(|e| map_sqlx_error("peek_oldest", e))?;
                Ok(Some(row.into()))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(message_id = %id), err)]
    async fn delete(&self, id: OutboxMessageId) -> Result<(), OutboxStoreError> {
        sqlx::query("DELETE FROM scheduler_outbox WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> OutboxStoreError {
    match err {
        sqlx::Error::Database(db_err) => OutboxStoreError::Database {
            operation,
            message: match db_err.code() {
                Some(code) => format!("{} (code {})", db_err.message(), code),
                None => db_err.message().to_string(),
            },
        },
        sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => OutboxStoreError::Unavailable {
            operation,
            message: err.to_string(),
        },
        other => OutboxStoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}

#[derive(Debug)]
struct OutboxRow {
    id: i64,
    message_type: String,
    data: String,
}

impl<'r> FromRow<'r, PgRow> for OutboxRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OutboxRow {
            id: row.try_get("id")?,
            message_type: row.try_get("type")?,
            data: row.try_get("data")?,
        })
    }
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        OutboxMessage::new(OutboxMessageId::new(row.id), row.message_type, row.data)
    }
}
