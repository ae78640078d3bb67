//! Checkpoint trait: persistence of session snapshots keyed by thread id.
//!
//! The engine writes a snapshot after every history append, so a process
//! that restarts mid-turn can resume from the last durable state.

use async_trait::async_trait;

use crate::error::CheckpointError;
use crate::message::ThreadId;
use crate::session::SessionState;

/// Stores the latest snapshot of each thread.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Load the latest snapshot for a thread.
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<SessionState>, CheckpointError>;

    /// Store a snapshot. A snapshot whose version is older than the stored
    /// one is ignored.
    async fn put(&self, thread_id: &ThreadId, state: &SessionState) -> Result<(), CheckpointError>;

    /// Forget a thread. Returns whether a snapshot existed.
    async fn delete(&self, thread_id: &ThreadId) -> Result<bool, CheckpointError>;

    /// All thread ids with a stored snapshot.
    async fn list_threads(&self) -> Result<Vec<ThreadId>, CheckpointError>;
}
