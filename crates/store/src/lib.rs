//! Storage backends for Scout: expense records and session checkpoints.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use scout_config::{CheckpointConfig, StoreConfig};
use scout_core::checkpoint::CheckpointStore;
use scout_core::error::{CheckpointError, StoreError};
use scout_core::expense::ExpenseStore;

pub use in_memory::{InMemoryCheckpointStore, InMemoryExpenseStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteCheckpointStore, SqliteExpenseStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresExpenseStore;

/// Turn a plain file path into a SQLite URL; URLs pass through unchanged.
pub fn sqlite_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{path}")
    }
}

/// Open the expense store selected by configuration.
pub async fn open_expense_store(config: &StoreConfig) -> Result<Arc<dyn ExpenseStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryExpenseStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            ensure_parent_dir(&config.path).map_err(StoreError::Storage)?;
            Ok(Arc::new(SqliteExpenseStore::new(&sqlite_url(&config.path)).await?))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Storage("store.url is not set".into()))?;
            Ok(Arc::new(PostgresExpenseStore::connect(url).await?))
        }
        other => Err(StoreError::Storage(format!(
            "expense backend '{other}' is not available in this build"
        ))),
    }
}

/// Open the checkpoint store selected by configuration.
pub async fn open_checkpoint_store(
    config: &CheckpointConfig,
) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryCheckpointStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            ensure_parent_dir(&config.path).map_err(CheckpointError::Storage)?;
            Ok(Arc::new(SqliteCheckpointStore::new(&sqlite_url(&config.path)).await?))
        }
        other => Err(CheckpointError::Storage(format!(
            "checkpoint backend '{other}' is not available in this build"
        ))),
    }
}

#[cfg(feature = "sqlite")]
fn ensure_parent_dir(path: &str) -> Result<(), String> {
    if path.contains(":memory:") {
        return Ok(());
    }
    let file = path
        .strip_prefix("sqlite://")
        .or_else(|| path.strip_prefix("sqlite:"))
        .unwrap_or(path);
    match std::path::Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| format!("create {}: {e}", dir.display()))
        }
        _ => Ok(()),
    }
}
