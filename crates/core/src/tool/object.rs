use std::pin::Pin;

use serde_json::Value;
use tracing::Instrument;

use super::{Error, Tool, ToolContext, ToolResult, stringify_output};

/// A boxed, running tool call.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(&self, arguments: Value, ctx: ToolContext) -> ToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(&self, arguments: Value, ctx: ToolContext) -> ToolFuture {
        let input: T::Input = match arguments {
            // Providers keep undecodable argument strings as they are.
            Value::String(raw) => {
                let reason = format!("arguments are not a JSON object: {raw}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
            arguments => match serde_json::from_value(arguments) {
                Ok(input) => input,
                Err(err) => {
                    let reason = format!("{err}");
                    return Box::pin(std::future::ready(ToolResult::Err(
                        Error::invalid_input().with_reason(reason),
                    )));
                }
            },
        };

        let span = debug_span!("tool execute", name = self.0.name(), id = ctx.call_id());
        let fut = self.0.execute(input, ctx);
        Box::pin(
            async move {
                let output = fut.await?;
                let result = stringify_output(&output);
                trace!("tool finished: {result:?}");
                result
            }
            .instrument(span),
        )
    }
}
