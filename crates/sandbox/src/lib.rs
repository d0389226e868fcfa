//! A sandboxed JavaScript evaluator for model-supplied code.
//!
//! Each evaluation gets a fresh QuickJS runtime with only the standard
//! built-ins (`Math`, `JSON`, `Date`, arrays, strings and so on). Nothing
//! from the host is bound into it, so evaluated code cannot reach the
//! filesystem, the network, the environment or the process.
//!
//! Evaluations run on the blocking pool under a memory limit, a stack limit
//! and a wall-clock deadline, and can be interrupted through a
//! [`CancellationToken`].

#[macro_use]
extern crate tracing;

mod engine;
mod error;
mod limits;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

pub use error::SandboxFault;
pub use limits::SandboxLimits;

use engine::Interrupt;

/// Extra time the caller waits beyond the engine's own deadline before
/// giving up on the worker thread.
const DEADLINE_GRACE: Duration = Duration::from_millis(100);

/// Which kind of code evaluation is available.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EvalCapability {
    /// Evaluation requests are refused.
    #[default]
    Disabled,
    /// Evaluation runs in a sandboxed JavaScript engine.
    SandboxedInterpreter(SandboxLimits),
}

/// Evaluates code according to its [`EvalCapability`].
#[derive(Clone, Debug, Default)]
pub struct SandboxEvaluator {
    capability: EvalCapability,
}

impl SandboxEvaluator {
    #[inline]
    pub fn new(capability: EvalCapability) -> Self {
        Self { capability }
    }

    #[inline]
    pub fn disabled() -> Self {
        Self::new(EvalCapability::Disabled)
    }

    #[inline]
    pub fn sandboxed(limits: SandboxLimits) -> Self {
        Self::new(EvalCapability::SandboxedInterpreter(limits))
    }

    #[inline]
    pub fn capability(&self) -> &EvalCapability {
        &self.capability
    }

    /// Evaluates `code` and converts the result into JSON.
    ///
    /// `code` may be an expression or a script; a script evaluates to its
    /// last statement. Cancelling `cancel`, or dropping the returned future,
    /// stops the engine.
    pub async fn evaluate(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, SandboxFault> {
        let EvalCapability::SandboxedInterpreter(limits) = &self.capability else {
            return Err(SandboxFault::Disabled);
        };
        if cancel.is_cancelled() {
            return Err(SandboxFault::Cancelled);
        }

        let span = debug_span!("sandbox eval", code_len = code.len());
        let interrupt = Interrupt::new(limits.timeout, cancel.clone());
        let _abandon = interrupt.abandon_on_drop();
        let task = spawn_worker(code.to_owned(), limits.clone(), interrupt, span.clone());

        let result = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SandboxFault::Cancelled),
                joined = task => joined
                    .unwrap_or_else(|err| Err(SandboxFault::Internal(err.to_string()))),
                _ = tokio::time::sleep(limits.timeout + DEADLINE_GRACE) => {
                    Err(SandboxFault::Timeout(limits.timeout))
                }
            }
        }
        .instrument(span.clone())
        .await;

        if let Err(fault) = &result {
            span.in_scope(|| debug!("evaluation failed: {fault}"));
        }
        result
    }

    /// Evaluates `code` on the current thread, without cancellation.
    pub fn evaluate_blocking(&self, code: &str) -> Result<serde_json::Value, SandboxFault> {
        let EvalCapability::SandboxedInterpreter(limits) = &self.capability else {
            return Err(SandboxFault::Disabled);
        };
        let interrupt = Interrupt::new(limits.timeout, CancellationToken::new());
        engine::run(code, limits, &interrupt)
    }
}

fn spawn_worker(
    code: String,
    limits: SandboxLimits,
    interrupt: Interrupt,
    span: Span,
) -> JoinHandle<Result<serde_json::Value, SandboxFault>> {
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| engine::run(&code, &limits, &interrupt))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropping_the_caller_stops_the_worker() {
        let limits = SandboxLimits::default().with_timeout(Duration::from_secs(60));
        let interrupt = Interrupt::new(limits.timeout, CancellationToken::new());
        let abandon = interrupt.abandon_on_drop();
        let worker = spawn_worker("while (true) {}".to_owned(), limits, interrupt, Span::none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(abandon);

        let result = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker kept running")
            .unwrap();
        assert_eq!(result, Err(SandboxFault::Cancelled));
    }
}
