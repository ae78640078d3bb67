//! Turn router: decides what follows an assistant reply.

use scout_core::message::Message;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The two ways a turn can proceed after inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// The reply requested tools; dispatch them and infer again.
    InvokeTools,
    /// The reply is final for this turn.
    FinishTurn,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvokeTools => "invoke_tools",
            Self::FinishTurn => "finish_turn",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route the most recent assistant message.
///
/// Total over every message shape. Anything other than an assistant
/// message finishes the turn and is logged.
pub fn route(message: &Message) -> Route {
    match message {
        Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => Route::InvokeTools,
        Message::Assistant { .. } => Route::FinishTurn,
        other => {
            warn!(role = %other.role(), "Router received a non-assistant message; finishing turn");
            Route::FinishTurn
        }
    }
}
