//! The conversation engine.
//!
//! One turn walks the state machine
//!
//! ```text
//! AWAIT_INPUT → INFER → ROUTE ─┬─ EXECUTE_TOOLS → INFER …
//!                              └─ EMIT → AWAIT_INPUT
//! ```
//!
//! Every append to the session is checkpointed before the next step runs,
//! so a turn interrupted at any point can be resumed from the store. Tool
//! calls in one reply are dispatched sequentially and their results are
//! appended in request order. Turns on the same thread are serialised by a
//! per-thread lock; distinct threads proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use scout_config::AppConfig;
use scout_core::checkpoint::CheckpointStore;
use scout_core::error::ProviderError;
use scout_core::event::{DomainEvent, EventBus};
use scout_core::message::{Message, MessageToolCall, ThreadId};
use scout_core::provider::{Provider, ProviderRequest, ToolCallDelta, Usage};
use scout_core::session::SessionState;
use scout_core::tool::{ToolContext, ToolRegistry};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::prompt::PromptTemplate;
use crate::router::{Route, route};
use crate::stream_adapter;

/// Caller-visible output of a streamed turn. The stream ends when the turn
/// does; a failed turn ends with one `Err` item.
pub type TurnStream = ReceiverStream<Result<String, AgentError>>;

type ChunkSender = mpsc::Sender<Result<String, AgentError>>;

/// Tool result recorded for calls left unexecuted when a turn exceeds its
/// tool-round budget.
const ROUND_LIMIT_RESULT: &str = "Error: max tool iterations exceeded; call was not executed";

/// Summary of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: ThreadId,

    /// Text of the final assistant reply (empty if the model sent none)
    pub reply: String,

    /// Number of INFER → EXECUTE_TOOLS cycles
    pub tool_rounds: usize,

    /// Number of tool calls dispatched
    pub tool_calls: usize,

    /// Messages appended to history during the turn
    pub messages_appended: usize,

    /// Token usage summed over every inference in the turn
    pub usage: Option<Usage>,
}

impl TurnOutcome {
    fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            reply: String::new(),
            tool_rounds: 0,
            tool_calls: 0,
            messages_appended: 0,
            usage: None,
        }
    }
}

/// Drives conversation turns for any number of threads.
///
/// Cheap to clone; clones share the provider, tools, checkpoint store and
/// thread locks.
#[derive(Clone)]
pub struct ConversationEngine {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// 0 means unbounded
    max_tool_rounds: usize,
    prompt: PromptTemplate,
    default_customer_id: String,
    locks: Arc<Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>>,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let settings = scout_config::AgentSettings::default();
        Self {
            provider,
            tools,
            checkpoints,
            event_bus,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_rounds: settings.max_tool_rounds,
            prompt: PromptTemplate::new(settings.name, settings.system_prompt),
            default_customer_id: settings.customer_id,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build an engine with model, prompt and limits taken from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let engine = Self::new(provider, &config.model, tools, checkpoints, event_bus)
            .with_temperature(config.temperature)
            .with_max_tool_rounds(config.agent.max_tool_rounds)
            .with_prompt(PromptTemplate::new(
                &config.agent.name,
                &config.agent.system_prompt,
            ))
            .with_default_customer(&config.agent.customer_id);
        match config.max_tokens {
            Some(max) => engine.with_max_tokens(max),
            None => engine,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Limit consecutive tool rounds per turn. 0 disables the limit.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Customer used when a turn arrives for a thread nobody opened.
    pub fn with_default_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.default_customer_id = customer_id.into();
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn default_customer_id(&self) -> &str {
        &self.default_customer_id
    }

    /// Create a session, or resume the checkpointed one for `thread_id`.
    ///
    /// A resumed session keeps the customer it was created with.
    pub async fn open_session(
        &self,
        thread_id: &ThreadId,
        customer_id: &str,
    ) -> Result<SessionState, AgentError> {
        let guard = self.lock_thread(thread_id).await;
        let result = self.open_session_locked(thread_id, customer_id).await;
        self.release_thread(thread_id, guard).await;
        result
    }

    async fn open_session_locked(
        &self,
        thread_id: &ThreadId,
        customer_id: &str,
    ) -> Result<SessionState, AgentError> {
        if let Some(state) = self.checkpoints.get(thread_id).await? {
            if state.customer_id() != customer_id {
                warn!(
                    thread_id = %thread_id,
                    stored = %state.customer_id(),
                    requested = %customer_id,
                    "Resuming session with its original customer"
                );
            }
            info!(thread_id = %thread_id, messages = state.len(), "Resumed session");
            return Ok(state);
        }

        let state = SessionState::new(thread_id.clone(), customer_id);
        self.checkpoints.put(thread_id, &state).await?;
        info!(thread_id = %thread_id, customer = %customer_id, "Opened session");
        Ok(state)
    }

    /// The latest checkpointed state of a thread.
    pub async fn session(&self, thread_id: &ThreadId) -> Result<Option<SessionState>, AgentError> {
        Ok(self.checkpoints.get(thread_id).await?)
    }

    /// Mark a session terminated. Later turns on it fail with
    /// `SessionTerminated`.
    pub async fn end_session(&self, thread_id: &ThreadId) -> Result<SessionState, AgentError> {
        let guard = self.lock_thread(thread_id).await;
        let result = self.end_session_locked(thread_id).await;
        self.release_thread(thread_id, guard).await;
        result
    }

    async fn end_session_locked(&self, thread_id: &ThreadId) -> Result<SessionState, AgentError> {
        let mut state = self
            .checkpoints
            .get(thread_id)
            .await?
            .ok_or_else(|| AgentError::UnknownSession(thread_id.to_string()))?;
        state.terminate();
        self.checkpoints.put(thread_id, &state).await?;

        info!(thread_id = %thread_id, messages = state.len(), "Session ended");
        self.event_bus.publish(DomainEvent::SessionEnded {
            thread_id: thread_id.to_string(),
            messages: state.len(),
            timestamp: Utc::now(),
        });
        Ok(state)
    }

    /// Run one turn to completion and return its outcome.
    pub async fn step_turn(
        &self,
        thread_id: &ThreadId,
        message: impl Into<String>,
    ) -> Result<TurnOutcome, AgentError> {
        self.drive(thread_id, Some(message.into()), None).await
    }

    /// Re-enter inference without new input, e.g. after an inference
    /// failure or a restart mid-turn. Tool calls that were requested but
    /// never answered are dispatched first.
    pub async fn resume_turn(&self, thread_id: &ThreadId) -> Result<TurnOutcome, AgentError> {
        self.drive(thread_id, None, None).await
    }

    /// Run one turn, streaming caller-visible text as it is produced.
    ///
    /// The turn runs on its own task and completes (and checkpoints) even
    /// if the returned stream is dropped.
    pub fn run_turn(&self, thread_id: ThreadId, message: impl Into<String>) -> TurnStream {
        let (tx, rx) = mpsc::channel(128);
        let engine = self.clone();
        let message = message.into();

        tokio::spawn(async move {
            if let Err(e) = engine.drive(&thread_id, Some(message), Some(&tx)).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn lock_thread(&self, thread_id: &ThreadId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(thread_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Release a thread lock, forgetting it when nobody else holds or
    /// awaits it.
    async fn release_thread(&self, thread_id: &ThreadId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    async fn drive(
        &self,
        thread_id: &ThreadId,
        input: Option<String>,
        sink: Option<&ChunkSender>,
    ) -> Result<TurnOutcome, AgentError> {
        let guard = self.lock_thread(thread_id).await;
        let result = self.drive_locked(thread_id, input, sink).await;
        self.release_thread(thread_id, guard).await;

        if let Err(e) = &result {
            warn!(thread_id = %thread_id, error = %e, "Turn failed");
            self.event_bus.publish(DomainEvent::TurnFailed {
                thread_id: thread_id.to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn drive_locked(
        &self,
        thread_id: &ThreadId,
        input: Option<String>,
        sink: Option<&ChunkSender>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut state = match self.checkpoints.get(thread_id).await? {
            Some(state) => state,
            None if input.is_some() => {
                debug!(thread_id = %thread_id, customer = %self.default_customer_id, "Creating session on first turn");
                SessionState::new(thread_id.clone(), &self.default_customer_id)
            }
            None => return Err(AgentError::UnknownSession(thread_id.to_string())),
        };
        if state.is_terminal() {
            return Err(AgentError::SessionTerminated(thread_id.to_string()));
        }

        let start_len = state.len();
        let ctx = ToolContext::new(thread_id.clone(), state.customer_id());
        let mut outcome = TurnOutcome::new(thread_id.clone());

        // AWAIT_INPUT → INFER
        let unanswered = unanswered_calls(&state);
        if !unanswered.is_empty() {
            warn!(thread_id = %thread_id, calls = unanswered.len(), "Dispatching tool calls left unanswered by an earlier turn");
            outcome.tool_rounds += 1;
            self.execute_tools(&mut state, &ctx, &unanswered, &mut outcome)
                .await?;
        }
        match input {
            Some(text) => {
                info!(thread_id = %thread_id, "Turn started");
                self.event_bus.publish(DomainEvent::TurnStarted {
                    thread_id: thread_id.to_string(),
                    content_preview: text.chars().take(80).collect(),
                    timestamp: Utc::now(),
                });
                self.commit(&mut state, Message::user(text)).await?;
            }
            None => {
                if !matches!(
                    state.last_message(),
                    Some(Message::User { .. } | Message::Tool { .. })
                ) {
                    return Err(AgentError::NothingToResume(thread_id.to_string()));
                }
                info!(thread_id = %thread_id, messages = state.len(), "Resuming turn");
            }
        }

        loop {
            let reply = self.infer(&state, sink, &mut outcome).await?;
            self.commit(&mut state, reply.clone()).await?;

            match route(&reply) {
                Route::FinishTurn => {
                    outcome.reply = reply.text().unwrap_or_default().to_string();
                    outcome.messages_appended = state.len() - start_len;
                    info!(
                        thread_id = %thread_id,
                        rounds = outcome.tool_rounds,
                        tool_calls = outcome.tool_calls,
                        "Turn finished"
                    );
                    return Ok(outcome);
                }
                Route::InvokeTools => {
                    outcome.tool_rounds += 1;
                    if self.max_tool_rounds > 0 && outcome.tool_rounds > self.max_tool_rounds {
                        warn!(
                            thread_id = %thread_id,
                            max = self.max_tool_rounds,
                            "Max tool rounds reached, failing turn"
                        );
                        for call in reply.tool_calls() {
                            self.commit(&mut state, Message::tool_result(&call.id, ROUND_LIMIT_RESULT))
                                .await?;
                        }
                        return Err(AgentError::MaxToolRoundsExceeded {
                            rounds: self.max_tool_rounds,
                        });
                    }
                    debug!(
                        thread_id = %thread_id,
                        round = outcome.tool_rounds,
                        calls = reply.tool_calls().len(),
                        "Executing tool calls"
                    );
                    self.execute_tools(&mut state, &ctx, reply.tool_calls(), &mut outcome)
                        .await?;
                }
            }
        }
    }

    /// Append a message and checkpoint the result.
    async fn commit(&self, state: &mut SessionState, message: Message) -> Result<(), AgentError> {
        state.append(message)?;
        self.checkpoints.put(state.thread_id(), state).await?;
        Ok(())
    }

    /// Dispatch calls in order; each result is appended and checkpointed
    /// before the next call starts.
    async fn execute_tools(
        &self,
        state: &mut SessionState,
        ctx: &ToolContext,
        calls: &[MessageToolCall],
        outcome: &mut TurnOutcome,
    ) -> Result<(), AgentError> {
        for call in calls {
            let start = Instant::now();
            let result = self.tools.dispatch(call, ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            debug!(
                thread_id = %ctx.thread_id,
                tool = %call.name,
                call_id = %call.id,
                success = result.success,
                duration_ms,
                "Tool call finished"
            );
            self.event_bus.publish(DomainEvent::ToolExecuted {
                thread_id: ctx.thread_id.to_string(),
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });

            outcome.tool_calls += 1;
            self.commit(state, Message::tool_result(&call.id, result.output))
                .await?;
        }
        Ok(())
    }

    /// INFER: one model call over the full history. Nothing is appended
    /// here, so a failure leaves the session at its last checkpoint.
    async fn infer(
        &self,
        state: &SessionState,
        sink: Option<&ChunkSender>,
        outcome: &mut TurnOutcome,
    ) -> Result<Message, AgentError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            system_prompt: self
                .prompt
                .render(state.customer_id(), Utc::now().date_naive()),
            messages: state.snapshot(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            stream: sink.is_some(),
        };
        debug!(
            thread_id = %state.thread_id(),
            messages = request.messages.len(),
            provider = self.provider.name(),
            "Invoking model"
        );

        let (message, usage, model) = match sink {
            Some(tx) => self.infer_streaming(request, tx).await?,
            None => {
                let response = self.provider.complete(request).await?;
                (response.message, response.usage, response.model)
            }
        };

        if let Some(usage) = &usage {
            add_usage(&mut outcome.usage, usage);
        }
        self.event_bus.publish(DomainEvent::ReplyGenerated {
            thread_id: state.thread_id().to_string(),
            model,
            tool_calls: message.tool_calls().len(),
            tokens_used: usage.map(|u| u.total_tokens).unwrap_or(0),
            timestamp: Utc::now(),
        });
        Ok(message)
    }

    /// Consume a provider stream, forwarding rendered fragments to `tx` and
    /// assembling the full reply. Tool calls are accumulated by index.
    async fn infer_streaming(
        &self,
        request: ProviderRequest,
        tx: &ChunkSender,
    ) -> Result<(Message, Option<Usage>, String), AgentError> {
        let model = request.model.clone();
        let mut rx = self.provider.stream(request).await?;

        let mut text = String::new();
        let mut calls: BTreeMap<u32, PartialCall> = BTreeMap::new();
        let mut usage = None;
        let mut finished = false;

        while let Some(item) = rx.recv().await {
            let chunk = item?;

            for fragment in stream_adapter::fragments(&chunk) {
                if let Some(out) = stream_adapter::render(&fragment) {
                    // A dropped receiver does not cancel the turn.
                    let _ = tx.send(Ok(out)).await;
                }
            }

            if let Some(content) = &chunk.content {
                text.push_str(content);
            }
            for delta in &chunk.tool_call_deltas {
                calls.entry(delta.index).or_default().merge(delta);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                finished = true;
                break;
            }
        }

        if !finished {
            return Err(ProviderError::StreamInterrupted(
                "stream closed before the reply finished".into(),
            )
            .into());
        }

        let tool_calls = calls.into_values().map(PartialCall::finish).collect();
        Ok((
            Message::assistant_with_tools(Some(text), tool_calls),
            usage,
            model,
        ))
    }
}

/// A tool call being assembled from stream deltas.
#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn merge(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = delta.id.as_ref().filter(|id| !id.is_empty()) {
            self.id = Some(id.clone());
        }
        if let Some(name) = &delta.name {
            self.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            self.arguments.push_str(args);
        }
    }

    fn finish(self) -> MessageToolCall {
        let id = self
            .id
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        MessageToolCall::new(id, self.name, self.arguments)
    }
}

/// Calls of the last assistant message that have no result yet, in order.
fn unanswered_calls(state: &SessionState) -> Vec<MessageToolCall> {
    let pending = state.pending_tool_calls();
    if pending.is_empty() {
        return Vec::new();
    }
    state
        .messages()
        .iter()
        .rev()
        .find(|m| matches!(m, Message::Assistant { .. }))
        .map(|m| {
            m.tool_calls()
                .iter()
                .filter(|c| pending.contains(&c.id))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn add_usage(total: &mut Option<Usage>, usage: &Usage) {
    match total {
        Some(t) => {
            t.prompt_tokens += usage.prompt_tokens;
            t.completion_tokens += usage.completion_tokens;
            t.total_tokens += usage.total_tokens;
        }
        None => *total = Some(usage.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use scout_core::error::ToolError;
    use scout_core::expense::{ExpenseCategory, ExpenseStore};
    use scout_core::provider::{FinishReason, StreamChunk};
    use scout_core::tool::{Tool, ToolResult};
    use scout_store::{InMemoryCheckpointStore, InMemoryExpenseStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    struct Harness {
        engine: ConversationEngine,
        expenses: Arc<InMemoryExpenseStore>,
        checkpoints: Arc<InMemoryCheckpointStore>,
    }

    fn harness(provider: Arc<dyn Provider>) -> Harness {
        let expenses = Arc::new(InMemoryExpenseStore::new());
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let tools = Arc::new(scout_tools::expense_registry(expenses.clone()));
        let engine = ConversationEngine::new(
            provider,
            "mock-model",
            tools,
            checkpoints.clone(),
            Arc::new(EventBus::default()),
        );
        Harness {
            engine,
            expenses,
            checkpoints,
        }
    }

    async fn opened(provider: Arc<dyn Provider>) -> (Harness, ThreadId) {
        let h = harness(provider);
        let thread = ThreadId::from("thread-1");
        h.engine.open_session(&thread, "C1").await.unwrap();
        (h, thread)
    }

    async fn history(h: &Harness, thread: &ThreadId) -> Vec<Message> {
        h.engine
            .session(thread)
            .await
            .unwrap()
            .unwrap()
            .messages()
            .to_vec()
    }

    #[tokio::test]
    async fn text_only_turn_appends_two_messages() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hi! How can I help?"));
        let (h, thread) = opened(provider).await;

        let outcome = h.engine.step_turn(&thread, "Hello").await.unwrap();
        assert_eq!(outcome.reply, "Hi! How can I help?");
        assert_eq!(outcome.messages_appended, 2);
        assert_eq!(outcome.tool_rounds, 0);
        assert_eq!(outcome.usage.unwrap().total_tokens, 15);

        let messages = history(&h, &thread).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(route(&messages[1]), Route::FinishTurn);
    }

    #[tokio::test]
    async fn list_with_empty_store_yields_one_reply() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "list_expenses", json!({"customer_id": "C1"}))],
                "",
            ),
            make_text_response("You have no expenses yet."),
        ]));
        let (h, thread) = opened(provider.clone()).await;

        let outcome = h.engine.step_turn(&thread, "List my expenses").await.unwrap();
        assert_eq!(outcome.reply, "You have no expenses yet.");
        assert_eq!(outcome.tool_rounds, 1);

        let messages = history(&h, &thread).await;
        assert_eq!(messages.len(), 4);
        match &messages[2] {
            Message::Tool {
                tool_call_id,
                content,
            } => {
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(content, "[]");
            }
            other => panic!("expected tool result, got {other:?}"),
        }

        // The second inference saw the tool result.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert!(requests[0].system_prompt.contains("C1"));
        assert_eq!(requests[0].tools.len(), 4);
    }

    #[tokio::test]
    async fn create_scenario_appends_four_messages() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call(
                    "call_1",
                    "create_expense",
                    json!({"name": "lunch", "amount": 42, "category": "Meals"}),
                )],
                "",
            ),
            make_text_response("Added your $42 lunch."),
        ]));
        let (h, thread) = opened(provider).await;

        let outcome = h.engine.step_turn(&thread, "Add a $42 lunch expense").await.unwrap();
        assert_eq!(outcome.messages_appended, 4);
        assert_eq!(outcome.tool_calls, 1);

        let stored = h.expenses.list("C1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, ExpenseCategory::Meals);
        assert_eq!(stored[0].amount, 42.0);
    }

    #[tokio::test]
    async fn multiple_calls_run_in_request_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("call_a", "create_expense", json!({"name": "Taxi", "amount": 12, "category": "travel"})),
                    make_tool_call("call_b", "create_expense", json!({"name": "Hotel", "amount": 90, "category": "lodging"})),
                    make_tool_call("call_c", "list_expenses", json!({})),
                ],
                "On it.",
            ),
            make_text_response("Both recorded."),
        ]));
        let (h, thread) = opened(provider).await;

        h.engine.step_turn(&thread, "Add taxi and hotel").await.unwrap();

        let messages = history(&h, &thread).await;
        let results: Vec<(&str, &str)> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool {
                    tool_call_id,
                    content,
                } => Some((tool_call_id.as_str(), content.as_str())),
                _ => None,
            })
            .collect();
        let ids: Vec<&str> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["call_a", "call_b", "call_c"]);

        // Sequential dispatch: the list saw both creates.
        assert!(results[2].1.contains("Taxi"));
        assert!(results[2].1.contains("Hotel"));
    }

    #[tokio::test]
    async fn malformed_arguments_become_visible_failure() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "create_expense", json!({"amount": 5, "category": "meals"}))],
                "",
            ),
            make_text_response("What should I call that expense?"),
        ]));
        let (h, thread) = opened(provider.clone()).await;

        let outcome = h.engine.step_turn(&thread, "Add a $5 expense").await.unwrap();
        assert_eq!(outcome.reply, "What should I call that expense?");

        let requests = provider.requests();
        let failure = requests[1].messages.last().and_then(|m| m.text()).unwrap();
        assert!(failure.starts_with("Error:"));
        assert!(failure.contains("name"));
        assert!(h.expenses.list("C1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inference_failure_keeps_last_checkpoint_and_resumes() {
        let provider = Arc::new(SequentialMockProvider::with_script(vec![
            Err(ProviderError::Network("connection refused".into())),
            Ok(make_text_response("Back online.")),
        ]));
        let (h, thread) = opened(provider).await;

        let err = h.engine.step_turn(&thread, "Hello?").await.unwrap_err();
        assert!(matches!(err, AgentError::Inference(ProviderError::Network(_))));

        let messages = history(&h, &thread).await;
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::User { .. }));

        let outcome = h.engine.resume_turn(&thread).await.unwrap();
        assert_eq!(outcome.reply, "Back online.");
        assert_eq!(history(&h, &thread).await.len(), 2);
    }

    #[tokio::test]
    async fn resume_requires_pending_input() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hi"));
        let (h, thread) = opened(provider).await;
        h.engine.step_turn(&thread, "Hello").await.unwrap();

        let err = h.engine.resume_turn(&thread).await.unwrap_err();
        assert!(matches!(err, AgentError::NothingToResume(_)));

        let err = h.engine.resume_turn(&ThreadId::from("nobody")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn resume_dispatches_unanswered_calls_once() {
        let provider = Arc::new(SequentialMockProvider::single_text("Listed."));
        let h = harness(provider);
        let thread = ThreadId::from("crashed");

        // Simulate a restart after the assistant asked for two tools but
        // only the first result was checkpointed.
        let mut state = SessionState::new(thread.clone(), "C1");
        state.append(Message::user("list twice")).unwrap();
        state
            .append(Message::assistant_with_tools(
                None,
                vec![
                    MessageToolCall::new("call_1", "list_expenses", ""),
                    MessageToolCall::new("call_2", "list_expenses", ""),
                ],
            ))
            .unwrap();
        state.append(Message::tool_result("call_1", "[]")).unwrap();
        h.checkpoints.put(&thread, &state).await.unwrap();

        let outcome = h.engine.resume_turn(&thread).await.unwrap();
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.reply, "Listed.");

        let messages = history(&h, &thread).await;
        let answered: Vec<&str> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answered, vec!["call_1", "call_2"]);
    }

    #[tokio::test]
    async fn max_tool_rounds_fails_closed_with_paired_history() {
        let list = |id: &str| {
            make_tool_call_response(vec![make_tool_call(id, "list_expenses", json!({}))], "")
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![
            list("call_1"),
            list("call_2"),
            list("call_3"),
            make_text_response("Sorry about that."),
        ]));
        let h = harness(provider.clone());
        let engine = h.engine.clone().with_max_tool_rounds(2);
        let thread = ThreadId::from("loopy");
        engine.open_session(&thread, "C1").await.unwrap();

        let err = engine.step_turn(&thread, "List forever").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxToolRoundsExceeded { rounds: 2 }));
        assert_eq!(provider.call_count(), 3);

        let state = engine.session(&thread).await.unwrap().unwrap();
        assert!(state.pending_tool_calls().is_empty());
        assert!(
            state
                .last_message()
                .and_then(|m| m.text())
                .unwrap()
                .contains("max tool iterations exceeded")
        );

        // The session stays usable.
        let outcome = engine.step_turn(&thread, "Never mind").await.unwrap();
        assert_eq!(outcome.reply, "Sorry about that.");
    }

    #[tokio::test]
    async fn terminated_session_rejects_turns() {
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let (h, thread) = opened(provider.clone()).await;

        let ended = h.engine.end_session(&thread).await.unwrap();
        assert!(ended.is_terminal());

        let err = h.engine.step_turn(&thread, "Hello").await.unwrap_err();
        assert!(matches!(err, AgentError::SessionTerminated(_)));
        assert_eq!(provider.call_count(), 0);

        let err = h.engine.end_session(&ThreadId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn unknown_thread_gets_default_customer() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello C7"));
        let h = harness(provider.clone());
        let engine = h.engine.clone().with_default_customer("C7");
        let thread = ThreadId::from("fresh");

        engine.step_turn(&thread, "Hi").await.unwrap();
        let state = engine.session(&thread).await.unwrap().unwrap();
        assert_eq!(state.customer_id(), "C7");
        assert!(provider.requests()[0].system_prompt.contains("C7"));
    }

    #[tokio::test]
    async fn session_resumes_across_engines() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let tools = Arc::new(scout_tools::expense_registry(Arc::new(InMemoryExpenseStore::new())));
        let thread = ThreadId::from("shared");

        let first = ConversationEngine::new(
            Arc::new(SequentialMockProvider::single_text("Noted.")),
            "mock-model",
            tools.clone(),
            checkpoints.clone(),
            Arc::new(EventBus::default()),
        );
        first.open_session(&thread, "C1").await.unwrap();
        first.step_turn(&thread, "My name is Ada").await.unwrap();

        let provider = Arc::new(SequentialMockProvider::single_text("You are Ada."));
        let second = ConversationEngine::new(
            provider.clone(),
            "mock-model",
            tools,
            checkpoints,
            Arc::new(EventBus::default()),
        );
        let resumed = second.open_session(&thread, "C1").await.unwrap();
        assert_eq!(resumed.len(), 2);

        second.step_turn(&thread, "Who am I?").await.unwrap();
        assert_eq!(provider.requests()[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn streamed_turn_renders_markers_and_breaks() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "list_expenses", json!({}))],
                "Let me check.",
            ),
            make_text_response("Nothing yet."),
        ]));
        let (h, thread) = opened(provider).await;

        let chunks: Vec<String> = h
            .engine
            .run_turn(thread.clone(), "List my expenses")
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            chunks.concat(),
            "Let me check.\n\n< TOOL CALL: list_expenses >\n\n{}\n\nNothing yet."
        );
        assert_eq!(history(&h, &thread).await.len(), 4);
    }

    #[tokio::test]
    async fn streamed_deltas_accumulate_by_index() {
        let delta = |index: u32, id: Option<&str>, name: Option<&str>, args: &str| StreamChunk {
            tool_call_deltas: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                name: name.map(String::from),
                arguments: Some(args.to_string()),
            }],
            ..StreamChunk::default()
        };
        let finish = |reason: FinishReason| StreamChunk {
            finish_reason: Some(reason),
            done: true,
            ..StreamChunk::default()
        };

        let provider = Arc::new(FragmentStreamProvider::new(vec![
            vec![
                Ok(delta(0, Some("call_1"), Some("list_expenses"), "")),
                Ok(delta(1, Some("call_2"), Some("list_expenses"), "{\"customer")),
                Ok(delta(1, None, None, "_id\": \"C1\"}")),
                Ok(finish(FinishReason::ToolCalls)),
            ],
            vec![
                Ok(StreamChunk {
                    content: Some("Empty.".into()),
                    ..StreamChunk::default()
                }),
                Ok(finish(FinishReason::Stop)),
            ],
        ]));
        let (h, thread) = opened(provider).await;

        let out: Vec<String> = h
            .engine
            .run_turn(thread.clone(), "List")
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            out.concat(),
            "\n\n< TOOL CALL: list_expenses >\n\n\
             \n\n< TOOL CALL: list_expenses >\n\n{\"customer_id\": \"C1\"}\
             \n\nEmpty."
        );

        let messages = history(&h, &thread).await;
        let calls = messages[1].tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "");
        assert_eq!(calls[1].arguments, "{\"customer_id\": \"C1\"}");
        assert_eq!(messages[2].text(), Some("[]"));
        assert_eq!(messages[3].text(), Some("[]"));
    }

    #[tokio::test]
    async fn stream_error_commits_no_partial_reply() {
        let provider = Arc::new(FragmentStreamProvider::new(vec![vec![
            Ok(StreamChunk {
                content: Some("Partial".into()),
                ..StreamChunk::default()
            }),
            Err(ProviderError::StreamInterrupted("socket closed".into())),
        ]]));
        let (h, thread) = opened(provider).await;

        let items: Vec<Result<String, AgentError>> =
            h.engine.run_turn(thread.clone(), "Hi").collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Partial");
        assert!(matches!(
            items[1],
            Err(AgentError::Inference(ProviderError::StreamInterrupted(_)))
        ));

        let messages = history(&h, &thread).await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn stream_closed_without_done_commits_no_partial_reply() {
        let provider = Arc::new(FragmentStreamProvider::new(vec![vec![Ok(StreamChunk {
            content: Some("Half a rep".into()),
            ..StreamChunk::default()
        })]]));
        let (h, thread) = opened(provider).await;

        let items: Vec<Result<String, AgentError>> =
            h.engine.run_turn(thread.clone(), "Hi").collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Half a rep");
        assert!(matches!(
            items[1],
            Err(AgentError::Inference(ProviderError::StreamInterrupted(_)))
        ));

        let messages = history(&h, &thread).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some("Hi"));
    }

    #[tokio::test]
    async fn thread_locks_are_released_after_use() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("one"),
            make_text_response("two"),
        ]));
        let (h, thread) = opened(provider).await;
        let other = ThreadId::from("thread-2");

        h.engine.step_turn(&thread, "first").await.unwrap();
        h.engine.step_turn(&other, "second").await.unwrap();
        h.engine.end_session(&thread).await.unwrap();
        let _ = h.engine.end_session(&ThreadId::from("never-opened")).await;

        assert!(h.engine.locks.lock().await.is_empty());
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            _arguments: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            panic!("disk on fire")
        }
    }

    #[tokio::test]
    async fn panicking_tool_does_not_end_the_turn() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PanickingTool));
        let engine = ConversationEngine::new(
            Arc::new(SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("call_1", "boom", json!({}))], ""),
                make_text_response("Something went wrong with that tool."),
            ])),
            "mock-model",
            Arc::new(registry),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(EventBus::default()),
        );
        let thread = ThreadId::from("panic");

        let outcome = engine.step_turn(&thread, "Do it").await.unwrap();
        assert_eq!(outcome.reply, "Something went wrong with that tool.");

        let state = engine.session(&thread).await.unwrap().unwrap();
        let result = state.messages()[2].text().unwrap();
        assert!(result.starts_with("Error: tool 'boom' crashed"));
        assert!(result.contains("disk on fire"));
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_thread_serialise() {
        let provider = Arc::new(
            SequentialMockProvider::new(vec![
                make_text_response("first"),
                make_text_response("second"),
            ])
            .with_delay(Duration::from_millis(20)),
        );
        let (h, thread) = opened(provider).await;
        let other = h.engine.clone();

        let (a, b) = tokio::join!(
            h.engine.step_turn(&thread, "one"),
            other.step_turn(&thread, "two")
        );
        a.unwrap();
        b.unwrap();

        let roles: Vec<_> = history(&h, &thread)
            .await
            .iter()
            .map(|m| m.role())
            .collect();
        use scout_core::message::Role;
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn events_trace_the_turn() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("call_1", "list_expenses", json!({}))], ""),
            make_text_response("None."),
        ]));
        let (h, thread) = opened(provider).await;
        let mut rx = h.engine.event_bus().subscribe();

        h.engine.step_turn(&thread, "List").await.unwrap();
        h.engine.end_session(&thread).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::TurnStarted { .. } => "started".to_string(),
                DomainEvent::ReplyGenerated { tool_calls, .. } => format!("reply:{tool_calls}"),
                DomainEvent::ToolExecuted { tool_name, success, .. } => {
                    format!("tool:{tool_name}:{success}")
                }
                DomainEvent::TurnFailed { .. } => "failed".to_string(),
                DomainEvent::SessionEnded { messages, .. } => format!("ended:{messages}"),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "started",
                "reply:1",
                "tool:list_expenses:true",
                "reply:0",
                "ended:4"
            ]
        );
    }

    #[test]
    fn partial_call_without_id_gets_one() {
        let mut call = PartialCall::default();
        call.merge(&ToolCallDelta {
            index: 0,
            name: Some("list_expenses".into()),
            ..ToolCallDelta::default()
        });
        let finished = call.finish();
        assert!(finished.id.starts_with("call_"));
        assert_eq!(finished.name, "list_expenses");
    }
}
