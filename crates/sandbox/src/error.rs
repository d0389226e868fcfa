use std::time::Duration;

/// A structured fault raised while evaluating an expression.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SandboxFault {
    /// Evaluation is switched off for this evaluator.
    #[error("code evaluation is disabled")]
    Disabled,
    /// The source could not be parsed.
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// An identifier does not resolve to anything available in the sandbox.
    #[error("ReferenceError: {0}")]
    Reference(String),
    /// An operation was applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),
    /// A value is out of the allowed range.
    #[error("RangeError: {0}")]
    Range(String),
    /// The code threw something that is not one of the errors above.
    #[error("{0}")]
    Thrown(String),
    /// The evaluation ran out of memory or stack.
    #[error("evaluation exceeded its resources: {0}")]
    ResourceLimit(String),
    /// The evaluation did not finish in time.
    #[error("evaluation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The evaluation was cancelled by the caller.
    #[error("evaluation was cancelled")]
    Cancelled,
    /// The result could not be turned into a structured payload or string.
    #[error("result is not serializable: {0}")]
    Serialization(String),
    /// The evaluator itself failed.
    #[error("evaluator failure: {0}")]
    Internal(String),
}

impl SandboxFault {
    /// Returns `true` if the fault comes from the result conversion
    /// rather than from evaluating the expression.
    #[inline]
    pub fn is_serialization(&self) -> bool {
        matches!(self, SandboxFault::Serialization(_))
    }
}
