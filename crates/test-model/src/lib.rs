//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pipe_agent_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
};
use tokio::time::sleep;

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

#[derive(Default)]
struct Script {
    steps: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
    delay: Option<Duration>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to each request. Responses are consumed
/// in order, one per request. If there are no enough steps in the script, an
/// error will be returned.
///
/// Every request the provider receives is recorded, so tests can inspect
/// exactly what history the agent sent. Clones share the same script.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().steps.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.lock().delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of scripted responses not consumed yet.
    pub fn remaining_steps(&self) -> usize {
        self.lock().steps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_step(&self, req: &ModelRequest) -> (Option<Duration>, Result<ModelResponse, Error>) {
        let mut script = self.lock();
        script.requests.push(req.clone());
        let default_delay = script.delay;

        let Some(step) = script.steps.front_mut() else {
            return (
                default_delay,
                Err(Error {
                    message: "no enough steps",
                    kind: ErrorKind::Other,
                    status: None,
                }),
            );
        };
        let delay = step.delay.or(default_delay);

        if let Some(failure) = &mut step.failure {
            let err = Error {
                message: "scripted failure",
                kind: failure.kind,
                status: failure.status,
            };
            match failure.times {
                0 => return (delay, Err(err)),
                1 => step.failure = None,
                _ => failure.times -= 1,
            }
            return (delay, Err(err));
        }

        let response = step.to_response();
        script.steps.pop_front();
        (delay, Ok(response))
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        let (delay, result) = self.next_step(req);
        async move {
            sleep(delay.unwrap_or(Duration::from_millis(1))).await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use pipe_agent_model::{
        ModelFinishReason, ModelMessage, ModelTool, ToolCallRequest, ToolChoice,
    };
    use serde_json::json;

    use super::*;

    fn request(messages: Vec<ModelMessage>) -> ModelRequest {
        ModelRequest {
            messages,
            tools: vec![ModelTool {
                name: "web_search".to_owned(),
                description: "Searches the web".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" }
                    }
                }),
            }],
            tool_choice: ToolChoice::Auto,
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, let me take a look.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "web_search".to_owned(),
                arguments: json!({ "query": "rust" }),
            }),
        ]));

        let mut req = request(vec![ModelMessage::user("Hi")]);
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(resp.message.content.as_deref(), Some("Hello, world!"));

        req.messages.push(ModelMessage::Assistant(resp.message));
        req.messages.push(ModelMessage::user("Search rust"));
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
        let tool_call = &resp.message.tool_calls[0];
        assert_eq!(tool_call.name, "web_search");
        assert_eq!(tool_call.arguments, json!({ "query": "rust" }));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(provider.remaining_steps(), 0);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("ok").with_failures(
            2,
            ErrorKind::RateLimitExceeded,
            Some(429),
        ));

        let req = request(vec![ModelMessage::user("Hi")]);
        for _ in 0..2 {
            let err = provider.send_request(&req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
            assert_eq!(err.status(), Some(429));
        }
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(resp.message.content.as_deref(), Some("ok"));

        // Out of script.
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_infinite_failure() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::failing(500));

        let req = request(vec![ModelMessage::user("Hi")]);
        for _ in 0..3 {
            let err = provider.send_request(&req).await.unwrap_err();
            assert_eq!(err.status(), Some(500));
        }
        assert_eq!(provider.remaining_steps(), 1);
    }
}
