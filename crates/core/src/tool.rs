//! Tool call supports.

mod error;
mod invoker;
mod object;
mod registry;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use error::{Error, ErrorKind};
pub use invoker::{ToolInvoker, ToolOutcome};
pub use object::ToolFuture;
pub use registry::{DuplicateToolError, ToolRegistry};

/// The result of a tool call, as sent back to the model.
pub type ToolResult = Result<String, Error>;

/// Per-call information handed to [`Tool::execute`].
#[derive(Clone, Debug)]
pub struct ToolContext {
    call_id: String,
    cancel: CancellationToken,
}

impl ToolContext {
    /// Creates a context for the given call.
    #[inline]
    pub fn new<S: Into<String>>(call_id: S, cancel: CancellationToken) -> Self {
        Self {
            call_id: call_id.into(),
            cancel,
        }
    }

    /// Returns the id of the tool call being executed.
    #[inline]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Returns a token that is cancelled when the call should stop.
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as a service endpoint or an
/// evaluation policy. To do this, make the context an immutable state of the
/// tool, which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// The type of output the tool produces.
    ///
    /// A string output is sent to the model verbatim; anything else is
    /// sent as pretty-printed JSON.
    type Output: Serialize;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = Result<Self::Output, Error>> + Send + 'static;
}

/// Converts a tool output into the text sent to the model.
pub fn stringify_output<O: Serialize>(output: &O) -> ToolResult {
    let value = serde_json::to_value(output).map_err(|err| {
        Error::serialization().with_reason(format!("{err}"))
    })?;
    match value {
        Value::String(text) => Ok(text),
        other => serde_json::to_string_pretty(&other).map_err(|err| {
            Error::serialization().with_reason(format!("{err}"))
        }),
    }
}
