//! # Scout Core
//!
//! Domain types, traits, and error definitions for the Scout expense
//! assistant. This crate has **no I/O**; it defines the domain model
//! that all other crates implement against.
//!
//! Every replaceable subsystem (LLM provider, expense store, checkpoint
//! store, voice I/O) is a trait here. Implementations live in their
//! respective crates, and tests swap in scripted stand-ins.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod expense;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;
pub mod voice;

// Re-export key types at crate root for ergonomics
pub use checkpoint::CheckpointStore;
pub use error::{
    CheckpointError, Error, ProviderError, Result, StoreError, ToolError, VoiceError,
};
pub use event::{DomainEvent, EventBus};
pub use expense::{Expense, ExpenseCategory, ExpensePatch, ExpenseStore, NewExpense};
pub use message::{Message, MessageToolCall, Role, ThreadId};
pub use provider::{
    FinishReason, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use session::{HistoryError, SessionState};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
pub use voice::{RecordedAudio, SpeechSynthesizer, Transcriber};
