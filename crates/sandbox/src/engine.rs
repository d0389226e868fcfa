use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rquickjs::convert::Coerced;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Runtime, Value};
use tokio_util::sync::CancellationToken;

use crate::{SandboxFault, SandboxLimits};

/// Runs the model's code as an expression when it parses as one, and as a
/// script otherwise. Parsing happens before anything runs, so the code is
/// never executed twice.
const ENTRY: &str = r#"
(source) => {
    let run;
    try {
        run = new Function(`'use strict'; return (${source}
);`);
    } catch (err) {
        if (!(err instanceof SyntaxError)) throw err;
        run = () => (0, eval)(source);
    }
    return run();
}
"#;

/// Decides when a running evaluation has to stop.
#[derive(Clone)]
pub(crate) struct Interrupt {
    cancel: CancellationToken,
    abandoned: Arc<AtomicBool>,
    deadline: Instant,
    timeout: Duration,
}

impl Interrupt {
    pub(crate) fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            abandoned: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Returns a guard that stops the evaluation once dropped.
    pub(crate) fn abandon_on_drop(&self) -> AbandonOnDrop {
        AbandonOnDrop(Arc::clone(&self.abandoned))
    }

    fn fault(&self) -> Option<SandboxFault> {
        if self.cancel.is_cancelled() || self.abandoned.load(Ordering::Relaxed) {
            Some(SandboxFault::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(SandboxFault::Timeout(self.timeout))
        } else {
            None
        }
    }
}

pub(crate) struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Evaluates `code` in a fresh runtime and converts the result into JSON.
pub(crate) fn run(
    code: &str,
    limits: &SandboxLimits,
    interrupt: &Interrupt,
) -> Result<serde_json::Value, SandboxFault> {
    if code.len() > limits.max_source_bytes {
        return Err(SandboxFault::ResourceLimit(format!(
            "source exceeds {} bytes",
            limits.max_source_bytes
        )));
    }
    if let Some(fault) = interrupt.fault() {
        return Err(fault);
    }

    let runtime = Runtime::new().map_err(|err| SandboxFault::Internal(err.to_string()))?;
    runtime.set_memory_limit(limits.max_memory_bytes);
    runtime.set_max_stack_size(limits.max_stack_bytes);
    runtime.set_interrupt_handler(Some(Box::new({
        let interrupt = interrupt.clone();
        move || interrupt.fault().is_some()
    })));
    let context = Context::full(&runtime).map_err(|err| SandboxFault::Internal(err.to_string()))?;

    let json = context.with(|ctx| {
        let value = ctx
            .eval::<Function, _>(ENTRY)
            .and_then(|entry| entry.call::<_, Value>((code,)))
            .catch(&ctx);
        match value {
            Ok(value) => to_json(&ctx, value),
            Err(caught) => Err(interrupt.fault().unwrap_or_else(|| fault_from(caught))),
        }
    })?;

    let rendered = serde_json::to_string(&json)
        .map_err(|err| SandboxFault::Serialization(err.to_string()))?;
    if rendered.len() > limits.max_output_bytes {
        return Err(SandboxFault::Serialization(format!(
            "result of {} bytes exceeds the limit of {} bytes",
            rendered.len(),
            limits.max_output_bytes
        )));
    }
    trace!("evaluated to {} bytes", rendered.len());
    Ok(json)
}

/// Plain data goes through `JSON.stringify`. Anything it cannot represent
/// (`undefined`, functions, non-finite numbers, cycles) falls back to the
/// value's string form.
fn to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<serde_json::Value, SandboxFault> {
    let non_finite = value.as_float().is_some_and(|n| !n.is_finite());
    if !non_finite {
        if let Ok(Some(rendered)) = ctx.json_stringify(value.clone()).catch(ctx) {
            let rendered = rendered
                .to_string()
                .map_err(|err| SandboxFault::Serialization(err.to_string()))?;
            return serde_json::from_str(&rendered)
                .map_err(|err| SandboxFault::Serialization(err.to_string()));
        }
    }
    string_form(ctx, value)
        .map(serde_json::Value::String)
        .map_err(SandboxFault::Serialization)
}

fn string_form<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<String, String> {
    value
        .get::<Coerced<String>>()
        .catch(ctx)
        .map(|coerced| coerced.0)
        .map_err(|err| err.to_string())
}

fn fault_from(caught: CaughtError<'_>) -> SandboxFault {
    match caught {
        CaughtError::Exception(exception) => {
            let name = exception.as_object().get::<_, String>("name").ok();
            let message = exception.message().unwrap_or_default();
            if message.contains("out of memory")
                || message.contains("stack overflow")
                || message.contains("call stack")
            {
                return SandboxFault::ResourceLimit(message);
            }
            match name.as_deref() {
                Some("SyntaxError") => SandboxFault::Syntax(message),
                Some("ReferenceError") => SandboxFault::Reference(message),
                Some("TypeError") => SandboxFault::Type(message),
                Some("RangeError") => SandboxFault::Range(message),
                Some(name) => SandboxFault::Thrown(format!("{name}: {message}")),
                None => SandboxFault::Thrown(message),
            }
        }
        CaughtError::Value(value) => SandboxFault::Thrown(
            value
                .get::<Coerced<String>>()
                .map(|coerced| format!("Uncaught {}", coerced.0))
                .unwrap_or_else(|_| "Uncaught exception".to_owned()),
        ),
        CaughtError::Error(rquickjs::Error::Allocation) => {
            SandboxFault::ResourceLimit("out of memory".to_owned())
        }
        CaughtError::Error(err) => SandboxFault::Internal(err.to_string()),
    }
}
