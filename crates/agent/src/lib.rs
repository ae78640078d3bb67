//! The conversation control loop for Scout.
//!
//! A turn follows an **Infer → Route → Execute** cycle:
//!
//! 1. **Receive** a user message and append it to the session
//! 2. **Infer** over the rendered system prompt and the full history
//! 3. **Route** the reply: tool calls go to the registry, text ends the turn
//! 4. **Execute** each requested tool in order, append its result, and
//!    loop back to step 2
//!
//! Every append is checkpointed, so a session survives restarts and an
//! interrupted turn can be resumed.

pub mod engine;
pub mod error;
pub mod prompt;
pub mod router;
pub mod stream_adapter;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use engine::{ConversationEngine, TurnOutcome, TurnStream};
pub use error::AgentError;
pub use prompt::PromptTemplate;
pub use router::{Route, route};
pub use stream_adapter::{StreamFragment, render, tool_marker};
