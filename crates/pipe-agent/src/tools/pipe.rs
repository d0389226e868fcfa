use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::tool::{Error as ToolError, Tool, ToolContext};
use crate::service::ServiceClient;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct PipeInput {
    #[schemars(description = "The text the pipe works on.")]
    text: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize, JsonSchema)]
pub struct RunPipeParameters {
    #[schemars(description = "The ID of the pipe to run, e.g. `Pn38L1q`.")]
    pipe_id: String,
    #[schemars(description = "The JSON data sent to the pipe as its input.")]
    input_data: PipeInput,
}

/// A tool for running a data pipe on the pipe service.
pub struct RunPipeTool {
    client: ServiceClient,
    parameter_schema: Value,
}

impl RunPipeTool {
    /// Creates a new pipe tool.
    #[inline]
    pub fn new(client: ServiceClient) -> Self {
        RunPipeTool {
            client,
            parameter_schema: schema_for!(RunPipeParameters).to_value(),
        }
    }
}

impl Tool for RunPipeTool {
    type Input = RunPipeParameters;
    type Output = Value;

    fn name(&self) -> &str {
        "run_pipe"
    }

    fn description(&self) -> &str {
        "Runs a data pipe by its ID on the given input and returns the pipe's JSON output."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
        _ctx: ToolContext,
    ) -> impl Future<Output = Result<Self::Output, ToolError>> + Send + 'static
    {
        let RunPipeParameters {
            pipe_id,
            input_data,
        } = input;
        let request = check_pipe_id(&pipe_id).and_then(|_| {
            let payload = serde_json::to_value(&input_data).map_err(|err| {
                ToolError::serialization().with_reason(err.to_string())
            })?;
            Ok(self.client.post_json(&format!("pipe/{pipe_id}/run"), &payload))
        });
        async move { Ok(request?.await?) }
    }
}

/// The id becomes a path segment, so only URL-safe characters are allowed.
fn check_pipe_id(pipe_id: &str) -> Result<(), ToolError> {
    let valid = !pipe_id.is_empty()
        && pipe_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ToolError::invalid_input()
            .with_reason(format!("`{pipe_id}` is not a valid pipe id")))
    }
}
