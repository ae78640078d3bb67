//! Errors surfaced by the conversation engine.
//!
//! Tool failures never appear here: they are absorbed into history as
//! tool-result messages. Only inference, persistence and session-state
//! problems reach the caller.

use scout_core::error::{CheckpointError, ProviderError};
use scout_core::session::HistoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Inference failed: {0}")]
    Inference(#[from] ProviderError),

    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Session '{0}' has ended")]
    SessionTerminated(String),

    #[error("Max tool iterations exceeded ({rounds} rounds in one turn)")]
    MaxToolRoundsExceeded { rounds: usize },

    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    #[error("Session '{0}' has no pending input to resume")]
    NothingToResume(String),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

impl AgentError {
    /// Whether the session can continue with a retry or a new message.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Inference(_) | Self::MaxToolRoundsExceeded { .. } | Self::NothingToResume(_)
        )
    }
}

impl From<AgentError> for scout_core::Error {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Inference(p) => Self::Provider(p),
            AgentError::Checkpoint(c) => Self::Checkpoint(c),
            AgentError::History(h) => Self::History(h),
            other => Self::Internal(other.to_string()),
        }
    }
}
