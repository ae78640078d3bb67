//! Streaming adapter: engine fragments in, caller-visible text out.
//!
//! One fragment produces zero or one chunk. The only state needed to place
//! boundaries travels with the fragments themselves.

use scout_core::provider::{FinishReason, StreamChunk};

/// Separator emitted when a reply segment ends because it called tools.
pub const SEGMENT_BREAK: &str = "\n\n";

/// An incremental unit of assistant output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Partial reply text
    Text(String),
    /// Name of a tool call that is starting
    ToolName(String),
    /// A piece of the current tool call's argument payload
    ToolArguments(String),
    /// The reply segment finished
    SegmentFinished(FinishReason),
}

/// Inline marker announcing a tool call.
pub fn tool_marker(name: &str) -> String {
    format!("\n\n< TOOL CALL: {name} >\n\n")
}

/// Render one fragment.
pub fn render(fragment: &StreamFragment) -> Option<String> {
    match fragment {
        StreamFragment::Text(text) | StreamFragment::ToolArguments(text) if text.is_empty() => None,
        StreamFragment::Text(text) | StreamFragment::ToolArguments(text) => Some(text.clone()),
        StreamFragment::ToolName(name) => Some(tool_marker(name)),
        StreamFragment::SegmentFinished(FinishReason::ToolCalls) => Some(SEGMENT_BREAK.to_string()),
        StreamFragment::SegmentFinished(_) => None,
    }
}

/// Split a provider chunk into fragments, in output order.
pub fn fragments(chunk: &StreamChunk) -> Vec<StreamFragment> {
    let mut out = Vec::new();
    if let Some(text) = &chunk.content {
        out.push(StreamFragment::Text(text.clone()));
    }
    for delta in &chunk.tool_call_deltas {
        if let Some(name) = delta.name.as_ref().filter(|n| !n.is_empty()) {
            out.push(StreamFragment::ToolName(name.clone()));
        }
        if let Some(args) = &delta.arguments {
            out.push(StreamFragment::ToolArguments(args.clone()));
        }
    }
    if let Some(reason) = chunk.finish_reason {
        out.push(StreamFragment::SegmentFinished(reason));
    }
    out
}
