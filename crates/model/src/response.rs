use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::AssistantMessage;

/// A complete response from the model provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated message (`choices[0].message` in most wire formats).
    pub message: AssistantMessage,
    /// Why the model stopped generating, when the backend reports it.
    pub finish_reason: Option<ModelFinishReason>,
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
    /// The output hit the token limit.
    Length,
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments to pass to the tool, not validated against any
    /// schema yet.
    ///
    /// Providers that receive arguments as a JSON string decode it here.
    /// If the string is not valid JSON it is kept as a JSON string so the
    /// tool can report the problem back to the model.
    pub arguments: Value,
}
