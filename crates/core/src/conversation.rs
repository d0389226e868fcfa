//! Conversation-related types.

use std::collections::HashSet;

use pipe_agent_model::ModelMessage;

use crate::error::ConversationError;

/// An append-only, ordered log of messages.
///
/// Every append is validated against the message shape the backends
/// expect: an assistant message carries content or tool calls, its tool
/// call ids are unique, and each of those calls is answered by exactly one
/// tool message before anything else is appended. A rejected message
/// leaves the conversation untouched.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
    pending_tool_calls: Vec<String>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation seeded with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            messages: vec![ModelMessage::system(prompt)],
            pending_tool_calls: vec![],
        }
    }

    /// Appends a message, or rejects it if it breaks the conversation
    /// shape.
    pub fn append(&mut self, msg: ModelMessage) -> Result<(), ConversationError> {
        match &msg {
            ModelMessage::System { .. } | ModelMessage::User { .. } => {
                self.ensure_no_pending()?;
            }
            ModelMessage::Assistant(assistant) => {
                self.ensure_no_pending()?;
                if assistant.content.is_none() && assistant.tool_calls.is_empty() {
                    return Err(ConversationError::EmptyAssistantMessage);
                }
                let mut seen = HashSet::with_capacity(assistant.tool_calls.len());
                for call in &assistant.tool_calls {
                    if !seen.insert(call.id.as_str()) {
                        return Err(ConversationError::DuplicateToolCallId(
                            call.id.clone(),
                        ));
                    }
                }
                self.pending_tool_calls =
                    assistant.tool_calls.iter().map(|c| c.id.clone()).collect();
            }
            ModelMessage::Tool(result) => {
                let Some(pos) = self
                    .pending_tool_calls
                    .iter()
                    .position(|id| *id == result.id)
                else {
                    return Err(ConversationError::UnexpectedToolResult(
                        result.id.clone(),
                    ));
                };
                self.pending_tool_calls.swap_remove(pos);
            }
        }
        self.messages.push(msg);
        Ok(())
    }

    fn ensure_no_pending(&self) -> Result<(), ConversationError> {
        if self.pending_tool_calls.is_empty() {
            Ok(())
        } else {
            Err(ConversationError::UnansweredToolCalls(
                self.pending_tool_calls.len(),
            ))
        }
    }

    /// Returns a copy of the history for transmission.
    #[inline]
    pub fn snapshot(&self) -> Vec<ModelMessage> {
        self.messages.clone()
    }

    /// Returns the ids of tool calls that have no result yet.
    #[inline]
    pub fn pending_tool_calls(&self) -> &[String] {
        &self.pending_tool_calls
    }
}
