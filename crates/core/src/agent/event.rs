use serde_json::Value;

use crate::tool::ToolResult;

/// The stage an agent is in.
///
/// Every turn starts and ends in [`AwaitingUserInput`]. A failed turn
/// passes through [`TurnAborted`] on its way back.
///
/// [`AwaitingUserInput`]: AgentStage::AwaitingUserInput
/// [`TurnAborted`]: AgentStage::TurnAborted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgentStage {
    /// No turn is running; the agent accepts input.
    #[default]
    AwaitingUserInput,
    /// Waiting for the model to reply.
    RequestingCompletion,
    /// Running the tool calls of the latest reply.
    ExecutingTools,
    /// The turn failed and is being wound down.
    TurnAborted,
}

/// Something that happened during a turn, in the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    /// The user input was added to the conversation.
    UserMessageAdded {
        /// The text the user submitted.
        content: String,
    },
    /// The model produced text, either a final answer or commentary
    /// alongside tool calls.
    AssistantMessageAdded {
        /// The text of the message.
        content: String,
    },
    /// A tool call is about to run.
    ToolCallStarted {
        /// Id of the call.
        id: String,
        /// Name of the tool.
        name: String,
        /// Arguments as sent by the model.
        arguments: Value,
    },
    /// A tool call has settled.
    ToolCallCompleted {
        /// Id of the call.
        id: String,
        /// Name of the tool.
        name: String,
        /// The output, or the fault the call produced.
        result: ToolResult,
    },
    /// The turn ended without a final answer.
    TurnAborted {
        /// A diagnostic describing the failure.
        reason: String,
    },
}
