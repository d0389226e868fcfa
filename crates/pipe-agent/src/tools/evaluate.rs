use pipe_agent_sandbox::{SandboxEvaluator, SandboxFault};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use crate::core::tool::{Error as ToolError, Tool, ToolContext};

#[derive(Deserialize, JsonSchema)]
pub struct EvaluateExpressionParameters {
    #[schemars(
        description = "JavaScript to evaluate: an expression such as `Math.sqrt(2) * 10`, or statements whose last one produces the value."
    )]
    code: String,
}

/// A tool for evaluating JavaScript in a sandboxed engine.
///
/// The code has no access to the host: no network, files or process,
/// only the standard built-ins.
pub struct EvaluateExpressionTool {
    evaluator: SandboxEvaluator,
    parameter_schema: Value,
}

impl EvaluateExpressionTool {
    /// Creates a new evaluation tool backed by `evaluator`.
    #[inline]
    pub fn new(evaluator: SandboxEvaluator) -> Self {
        EvaluateExpressionTool {
            evaluator,
            parameter_schema: schema_for!(EvaluateExpressionParameters).to_value(),
        }
    }
}

impl Tool for EvaluateExpressionTool {
    type Input = EvaluateExpressionParameters;
    type Output = Value;

    fn name(&self) -> &str {
        "evaluate_expression"
    }

    fn description(&self) -> &str {
        r#"
Evaluates JavaScript in a sandbox and returns its value.
Use this for calculations and string, array or date manipulation. There is no access to the network, files, or the DOM."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = Result<Self::Output, ToolError>> + Send + 'static
    {
        let evaluator = self.evaluator.clone();
        async move {
            evaluator
                .evaluate(&input.code, ctx.cancellation_token())
                .await
                .map_err(fault_to_error)
        }
    }
}

fn fault_to_error(fault: SandboxFault) -> ToolError {
    let err = match &fault {
        SandboxFault::Disabled => ToolError::permission_denied(),
        SandboxFault::Timeout(_) => ToolError::timeout(),
        SandboxFault::Cancelled => ToolError::cancelled(),
        SandboxFault::Serialization(_) => ToolError::serialization(),
        _ => ToolError::sandbox_fault(),
    };
    err.with_reason(fault.to_string())
}
