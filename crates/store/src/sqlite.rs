//! SQLite stores for expenses and session checkpoints.
//!
//! Each store owns its pool and creates its schema on open:
//! - `expenses`: one row per record, indexed by customer
//! - `checkpoints`: the latest JSON snapshot per thread
//!
//! Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use scout_core::checkpoint::CheckpointStore;
use scout_core::error::{CheckpointError, StoreError};
use scout_core::expense::{Expense, ExpenseCategory, ExpensePatch, ExpenseStore, NewExpense};
use scout_core::message::ThreadId;
use scout_core::session::SessionState;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Open a pool, creating the database file if needed.
///
/// An in-memory database lives only as long as its connection, so it gets
/// a single connection that is never recycled.
async fn open_pool(path: &str) -> Result<SqlitePool, String> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| format!("Invalid SQLite path: {e}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let in_memory = path.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to open SQLite: {e}"))
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

/// Expense store backed by a SQLite database.
pub struct SqliteExpenseStore {
    pool: SqlitePool,
}

impl SqliteExpenseStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = open_pool(path).await.map_err(StoreError::Storage)?;
        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite expense store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS expenses (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,
                name         TEXT NOT NULL,
                description  TEXT,
                category     TEXT NOT NULL DEFAULT 'other',
                amount       REAL NOT NULL,
                customer_id  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("expenses table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_expenses_customer ON expenses(customer_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("customer index: {e}")))?;

        debug!("SQLite expense migrations complete");
        Ok(())
    }

    fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;
        let category: String = row.try_get("category").map_err(|e| column("category", e))?;

        Ok(Expense {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
            name: row.try_get("name").map_err(|e| column("name", e))?,
            description: row.try_get("description").map_err(|e| column("description", e))?,
            category: ExpenseCategory::from_str(&category).map_err(StoreError::QueryFailed)?,
            amount: row.try_get("amount").map_err(|e| column("amount", e))?,
            customer_id: row.try_get("customer_id").map_err(|e| column("customer_id", e))?,
        })
    }
}

const EXPENSE_COLUMNS: &str =
    "id, created_at, updated_at, name, description, category, amount, customer_id";

#[async_trait]
impl ExpenseStore for SqliteExpenseStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, new: NewExpense) -> Result<Expense, StoreError> {
        let expense = Expense::from_new(new);

        sqlx::query(&format!(
            "INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .bind(expense.id.to_string())
        .bind(timestamp(&expense.created_at))
        .bind(timestamp(&expense.updated_at))
        .bind(&expense.name)
        .bind(&expense.description)
        .bind(expense.category.as_str())
        .bind(expense.amount)
        .bind(&expense.customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %expense.id, customer = %expense.customer_id, "Created expense");
        Ok(expense)
    }

    async fn get(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1 AND customer_id = ?2"
        ))
        .bind(id.to_string())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))?;

        row.as_ref().map(Self::row_to_expense).transpose()
    }

    async fn list(&self, customer_id: &str) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE customer_id = ?1 ORDER BY seq ASC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_expense).collect()
    }

    async fn update(
        &self,
        customer_id: &str,
        id: Uuid,
        patch: ExpensePatch,
    ) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE expenses SET
                name        = COALESCE(?1, name),
                description = CASE WHEN ?2 IS NULL THEN description ELSE NULLIF(?2, '') END,
                category    = COALESCE(?3, category),
                amount      = COALESCE(?4, amount),
                updated_at  = ?5
            WHERE id = ?6 AND customer_id = ?7
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.amount)
        .bind(timestamp(&Utc::now()))
        .bind(id.to_string())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE failed: {e}")))?;

        row.as_ref().map(Self::row_to_expense).transpose()
    }

    async fn delete(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM expenses WHERE id = ?1 AND customer_id = ?2 RETURNING {EXPENSE_COLUMNS}"
        ))
        .bind(id.to_string())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;

        row.as_ref().map(Self::row_to_expense).transpose()
    }
}

/// Durable checkpoint store: one JSON snapshot per thread, upserted.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub async fn new(path: &str) -> Result<Self, CheckpointError> {
        let pool = open_pool(path).await.map_err(CheckpointError::Storage)?;
        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite checkpoint store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id   TEXT PRIMARY KEY,
                version     INTEGER NOT NULL,
                state       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("checkpoints table: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<SessionState>, CheckpointError> {
        let row = sqlx::query("SELECT state FROM checkpoints WHERE thread_id = ?1")
            .bind(thread_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row
            .try_get("state")
            .map_err(|e| CheckpointError::Storage(format!("state column: {e}")))?;
        serde_json::from_str(&state)
            .map(Some)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    async fn put(&self, thread_id: &ThreadId, state: &SessionState) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        // Older snapshots never overwrite newer ones
        sqlx::query(
            r#"
            INSERT INTO checkpoints (thread_id, version, state, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(thread_id) DO UPDATE SET
                version = excluded.version,
                state = excluded.state,
                updated_at = excluded.updated_at
            WHERE excluded.version >= checkpoints.version
            "#,
        )
        .bind(thread_id.as_str())
        .bind(state.version() as i64)
        .bind(&json)
        .bind(timestamp(&state.updated_at()))
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("UPSERT failed: {e}")))?;

        debug!(thread_id = %thread_id, version = state.version(), "Checkpoint written");
        Ok(())
    }

    async fn delete(&self, thread_id: &ThreadId) -> Result<bool, CheckpointError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?1")
            .bind(thread_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, CheckpointError> {
        let rows = sqlx::query("SELECT thread_id FROM checkpoints ORDER BY updated_at DESC, thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("thread_id")
                    .map(ThreadId)
                    .map_err(|e| CheckpointError::Storage(format!("thread_id column: {e}")))
            })
            .collect()
    }
}
