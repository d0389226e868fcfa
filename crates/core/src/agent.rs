mod builder;
mod event;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipe_agent_model::{
    AssistantMessage, ModelMessage, ModelRequest, ModelTool, ToolCallResult,
    ToolChoice,
};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::conversation::Conversation;
use crate::error::{BackendError, TurnError};
use crate::model_client::ModelClient;
use crate::tool::{ToolInvoker, ToolOutcome};
pub use builder::AgentBuilder;
pub use event::{AgentEvent, AgentStage};

type EventFn = Box<dyn Fn(AgentEvent) + Send + Sync>;
type IdleFn = Box<dyn Fn() + Send + Sync>;

/// The final answer of a completed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The text of the final assistant message.
    pub reply: String,
    /// How many completion requests the turn took.
    pub requests: usize,
}

/// An agent instance, which maintains a conversation, a model client, and
/// the tools the model may call.
///
/// Input is processed one turn at a time. A turn starts with
/// [`submit`](Agent::submit) and keeps requesting completions and running
/// the requested tools until the model replies without tool calls. While a
/// turn is running, further submissions are rejected with
/// [`TurnError::Busy`].
///
/// The agent is cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    model_client: ModelClient,
    invoker: ToolInvoker,
    tool_specs: Vec<ModelTool>,
    tool_choice: ToolChoice,
    max_turns: usize,
    conversation: AsyncMutex<Conversation>,
    cancel: Mutex<CancellationToken>,
    stage: watch::Sender<AgentStage>,
    on_event: Option<EventFn>,
    on_idle: Option<IdleFn>,
}

impl Agent {
    /// Submits user input and runs a turn to completion.
    ///
    /// Events are delivered through the callback set with
    /// [`AgentBuilder::on_event`] while the turn runs. On failure the
    /// conversation keeps everything appended before the failing step, and
    /// the agent goes back to awaiting input either way.
    pub async fn submit<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<TurnOutcome, TurnError> {
        let Some(_turn) = TurnGuard::enter(&self.inner) else {
            warn!("rejecting input: a turn is still in progress");
            return Err(TurnError::Busy);
        };
        let mut conversation = self.inner.conversation.lock().await;

        let cancel = CancellationToken::new();
        *self.inner.lock_cancel() = cancel.clone();

        let result = self
            .inner
            .run_turn(&mut conversation, text.into(), &cancel)
            .instrument(debug_span!("turn"))
            .await;
        if let Err(err) = &result {
            warn!("turn aborted: {err}");
            self.inner.set_stage(AgentStage::TurnAborted);
            self.inner.emit(AgentEvent::TurnAborted {
                reason: err.to_string(),
            });
        }
        result
    }

    /// Cancels the running turn, if any.
    ///
    /// In-flight backend requests and tool calls are abandoned, and the
    /// turn fails with [`TurnError::Cancelled`].
    pub fn cancel_turn(&self) {
        debug!("cancelling the current turn");
        self.inner.lock_cancel().cancel();
    }

    /// Returns the current stage.
    #[inline]
    pub fn stage(&self) -> AgentStage {
        *self.inner.stage.borrow()
    }

    /// Returns a receiver that observes stage transitions.
    #[inline]
    pub fn subscribe_stage(&self) -> watch::Receiver<AgentStage> {
        self.inner.stage.subscribe()
    }

    /// Returns a copy of the conversation history.
    ///
    /// Waits for the running turn to finish, if any. Reading the history
    /// never makes a concurrent [`submit`](Agent::submit) fail.
    pub async fn history(&self) -> Vec<ModelMessage> {
        self.inner.conversation.lock().await.snapshot()
    }
}

impl AgentInner {
    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        text: String,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        self.answer_abandoned_calls(conversation);

        conversation.append(ModelMessage::user(text.clone()))?;
        self.emit(AgentEvent::UserMessageAdded { content: text });

        for requests in 1..=self.max_turns {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            self.set_stage(AgentStage::RequestingCompletion);
            let req = ModelRequest {
                messages: conversation.snapshot(),
                tools: self.tool_specs.clone(),
                tool_choice: self.tool_choice.clone(),
            };
            let resp = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                resp = self.model_client.send_request(&req) => resp?,
            };
            let message = normalize_reply(resp.message)?;

            conversation.append(ModelMessage::Assistant(message.clone()))?;
            let AssistantMessage {
                content,
                tool_calls,
            } = message;
            if tool_calls.is_empty() {
                let reply = content.unwrap_or_default();
                self.emit(AgentEvent::AssistantMessageAdded {
                    content: reply.clone(),
                });
                return Ok(TurnOutcome { reply, requests });
            }
            if let Some(content) = content.filter(|c| !c.trim().is_empty()) {
                self.emit(AgentEvent::AssistantMessageAdded { content });
            }

            self.set_stage(AgentStage::ExecutingTools);
            for call in &tool_calls {
                self.emit(AgentEvent::ToolCallStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }
            self.invoker
                .invoke_all(tool_calls, cancel, |ToolOutcome { call, result }| {
                    let content = match &result {
                        Ok(output) => output.clone(),
                        Err(err) => err.to_content(),
                    };
                    let msg = ModelMessage::Tool(ToolCallResult {
                        id: call.id.clone(),
                        content,
                    });
                    if let Err(err) = conversation.append(msg) {
                        error!("dropping the result of {}: {err}", call.id);
                    }
                    self.emit(AgentEvent::ToolCallCompleted {
                        id: call.id,
                        name: call.name,
                        result,
                    });
                })
                .await;
        }

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        Err(TurnError::TurnLimitExceeded {
            max_turns: self.max_turns,
        })
    }

    /// Answers tool calls left without results by a turn whose future was
    /// dropped mid-way, so the history stays well-formed.
    fn answer_abandoned_calls(&self, conversation: &mut Conversation) {
        let abandoned = conversation.pending_tool_calls().to_vec();
        if abandoned.is_empty() {
            return;
        }
        warn!("answering {} abandoned tool calls", abandoned.len());
        let content = crate::tool::Error::cancelled()
            .with_reason("the turn was abandoned")
            .to_content();
        for id in abandoned {
            let msg = ModelMessage::Tool(ToolCallResult {
                id,
                content: content.clone(),
            });
            if let Err(err) = conversation.append(msg) {
                error!("failed to answer an abandoned tool call: {err}");
            }
        }
    }

    fn emit(&self, event: AgentEvent) {
        trace!("emitting event: {event:?}");
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }

    fn set_stage(&self, stage: AgentStage) {
        let prev = self.stage.send_replace(stage);
        if prev != stage {
            debug!("stage: {prev:?} -> {stage:?}");
        }
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a turn as running for as long as it lives. Dropping it, even with
/// the turn future, puts the agent back to awaiting input.
struct TurnGuard<'a> {
    inner: &'a AgentInner,
}

impl<'a> TurnGuard<'a> {
    fn enter(inner: &'a AgentInner) -> Option<Self> {
        let entered = inner.stage.send_if_modified(|stage| {
            if *stage != AgentStage::AwaitingUserInput {
                return false;
            }
            *stage = AgentStage::RequestingCompletion;
            true
        });
        if entered {
            debug!("stage: AwaitingUserInput -> RequestingCompletion");
        }
        entered.then_some(Self { inner })
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.inner.set_stage(AgentStage::AwaitingUserInput);
        if let Some(on_idle) = &self.inner.on_idle {
            on_idle();
        }
    }
}

/// Checks a reply before it is appended. Replies with repeated tool call
/// ids are rejected as invalid; an empty reply becomes an empty answer.
fn normalize_reply(
    mut message: AssistantMessage,
) -> Result<AssistantMessage, BackendError> {
    let mut seen = HashSet::with_capacity(message.tool_calls.len());
    for call in &message.tool_calls {
        if !seen.insert(call.id.as_str()) {
            return Err(BackendError::invalid_response(format!(
                "tool call id `{}` appears more than once",
                call.id
            )));
        }
    }
    if message.content.is_none() && message.tool_calls.is_empty() {
        message.content = Some(String::new());
    }
    Ok(message)
}
