//! Session state: the append-only history of one conversation thread.
//!
//! A `SessionState` owns the ordered messages, the active customer id and
//! the termination flag. `append` enforces the tool-call pairing rule:
//! every call requested by an assistant message is answered by exactly one
//! tool result, in request order, before anything else is appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Message, ThreadId};

/// Why a message could not be appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("tool calls still awaiting results: {pending:?}")]
    PendingToolCalls { pending: Vec<String> },

    #[error("tool result for '{got}' is out of order (expected '{expected}')")]
    OutOfOrderToolResult { expected: String, got: String },

    #[error("tool result for '{0}' answers no pending tool call")]
    UnexpectedToolResult(String),

    #[error("session is terminated")]
    Terminated,
}

/// The mutable state of one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    thread_id: ThreadId,
    customer_id: String,
    messages: Vec<Message>,
    #[serde(default)]
    terminal: bool,
    /// Bumped on every mutation; lets checkpoint stores order snapshots.
    #[serde(default)]
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Create a fresh, empty session.
    pub fn new(thread_id: ThreadId, customer_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            customer_id: customer_id.into(),
            messages: Vec::new(),
            terminal: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Read-only copy of the current history, used as inference input.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Set the termination flag. Only the control loop calls this.
    pub fn terminate(&mut self) {
        if !self.terminal {
            self.terminal = true;
            self.touch();
        }
    }

    /// Call ids of the most recent assistant message that have no result yet,
    /// in request order.
    pub fn pending_tool_calls(&self) -> Vec<String> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };

        let mut pending: Vec<String> = self.messages[pos]
            .tool_calls()
            .iter()
            .map(|tc| tc.id.clone())
            .collect();

        for msg in &self.messages[pos + 1..] {
            if let Message::Tool { tool_call_id, .. } = msg
                && let Some(i) = pending.iter().position(|id| id == tool_call_id)
            {
                pending.remove(i);
            }
        }
        pending
    }

    /// Append a message, preserving the tool-call pairing invariant.
    pub fn append(&mut self, message: Message) -> Result<(), HistoryError> {
        if self.terminal {
            return Err(HistoryError::Terminated);
        }

        let pending = self.pending_tool_calls();
        match &message {
            Message::Tool { tool_call_id, .. } => match pending.first() {
                None => {
                    return Err(HistoryError::UnexpectedToolResult(tool_call_id.clone()));
                }
                Some(expected) if expected != tool_call_id => {
                    return Err(HistoryError::OutOfOrderToolResult {
                        expected: expected.clone(),
                        got: tool_call_id.clone(),
                    });
                }
                Some(_) => {}
            },
            _ if !pending.is_empty() => {
                return Err(HistoryError::PendingToolCalls { pending });
            }
            _ => {}
        }

        self.messages.push(message);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Total token estimate for the history.
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimated_tokens).sum()
    }
}
