use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pipe_agent_model::ToolCallRequest;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Error, ToolContext, ToolRegistry, ToolResult};

/// The settled result of one tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    /// The call as requested by the model.
    pub call: ToolCallRequest,
    /// What the call produced.
    pub result: ToolResult,
}

/// Runs the tool calls of one model reply concurrently and joins them.
///
/// Every call yields exactly one [`ToolOutcome`], whether it succeeds,
/// fails, panics, times out or is cancelled. A failing call never affects
/// its siblings.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    /// Creates an invoker with a timeout applied to each call.
    #[inline]
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Returns the registry the calls are dispatched to.
    #[inline]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs all calls and reports each outcome through `on_settled` as soon
    /// as it is available, so outcomes arrive in completion order.
    ///
    /// Returns once every call has settled. If `cancel` fires first, the
    /// running calls are aborted and each one still settles, with a
    /// [`Cancelled`](super::ErrorKind::Cancelled) error.
    pub async fn invoke_all<F>(
        &self,
        calls: Vec<ToolCallRequest>,
        cancel: &CancellationToken,
        mut on_settled: F,
    ) where
        F: FnMut(ToolOutcome),
    {
        let span = debug_span!("tool invoker", calls = calls.len());
        let mut tasks = JoinSet::new();
        let mut order: Vec<TaskId> = Vec::with_capacity(calls.len());
        let mut pending: HashMap<TaskId, ToolCallRequest> = HashMap::with_capacity(calls.len());

        for call in calls {
            trace!(parent: &span, "spawning a tool ({}) with args: {:?}", call.id, call.arguments);
            let ctx = ToolContext::new(call.id.clone(), cancel.child_token());
            let fut = self.registry.dispatch(&call.name, call.arguments.clone(), ctx);
            let timeout = self.timeout;
            let handle = tasks.spawn(
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout().with_reason(format!(
                            "tool did not finish within {}ms",
                            timeout.as_millis()
                        ))),
                    }
                }
                .instrument(span.clone()),
            );
            order.push(handle.id());
            pending.insert(handle.id(), call);
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(parent: &span, "cancelling {} running tools", pending.len());
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(err) if err.is_panic() => {
                    error!(parent: &span, "tool task panicked");
                    (err.id(), Err(Error::execution_error().with_reason("tool panicked")))
                }
                Err(err) => (err.id(), Err(Error::cancelled())),
            };
            if let Some(call) = pending.remove(&id) {
                on_settled(ToolOutcome { call, result });
            }
        }

        for id in order {
            if let Some(call) = pending.remove(&id) {
                let result = Err(Error::cancelled().with_reason("the turn was cancelled"));
                on_settled(ToolOutcome { call, result });
            }
        }
    }
}
