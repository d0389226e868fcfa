use std::time::Duration;

use pipe_agent_model::{
    AssistantMessage, ErrorKind, ModelFinishReason, ModelResponse,
    ToolCallRequest,
};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// A scripted failure, reported instead of the response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetFailure {
    /// Status code the fake backend answers with.
    pub status: Option<u16>,
    /// How many attempts fail before the response goes through. `0` means
    /// the request will fail infinitely.
    pub times: u64,
    #[serde(skip, default = "default_failure_kind")]
    pub kind: ErrorKind,
}

fn default_failure_kind() -> ErrorKind {
    ErrorKind::Other
}

/// The preset response for one completion request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail before (or instead of) succeeding.
    pub failure: Option<PresetFailure>,
    /// Extra latency for this response only.
    #[serde(skip)]
    pub delay: Option<Duration>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
            delay: None,
        }
    }

    /// Creates a text-only response.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a response that fails forever with the given status.
    #[inline]
    pub fn failing(status: u16) -> Self {
        Self::with_events([]).with_failures(0, ErrorKind::Other, Some(status))
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(
        mut self,
        times: u64,
        kind: ErrorKind,
        status: Option<u16>,
    ) -> Self {
        self.failure = Some(PresetFailure { status, times, kind });
        self
    }

    /// Delays this response.
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn to_response(&self) -> ModelResponse {
        let mut content: Option<String> = None;
        let mut tool_calls = vec![];
        for event in &self.events {
            match event {
                PresetEvent::MessageDelta(delta) => {
                    content.get_or_insert_default().push_str(delta);
                }
                PresetEvent::ToolCall(req) => tool_calls.push(req.clone()),
            }
        }
        let finish_reason = if tool_calls.is_empty() {
            ModelFinishReason::Stop
        } else {
            ModelFinishReason::ToolCalls
        };
        ModelResponse {
            message: AssistantMessage {
                content,
                tool_calls,
            },
            finish_reason: Some(finish_reason),
        }
    }
}
