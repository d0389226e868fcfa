use pipe_agent_model::{ErrorKind, ModelProviderError};

/// A failure reported by the language-model backend.
///
/// This is the type-erased form of a provider error. It keeps enough
/// information to decide whether the request may be retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// The kind of the failure.
    pub kind: ErrorKind,
    /// The HTTP status code, if the backend answered at all.
    pub status: Option<u16>,
    /// A human readable description.
    pub message: String,
}

impl BackendError {
    pub(crate) fn from_provider<E: ModelProviderError>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ErrorKind::InvalidResponse,
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` if sending the same request again may succeed.
    ///
    /// Rate limiting, transport failures and server-side (5xx) statuses
    /// are transient; everything else is permanent.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient() || matches!(self.status, Some(500..=599))
    }
}

/// A violation of the conversation shape.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// An assistant message has neither content nor tool calls.
    #[error("assistant message has neither content nor tool calls")]
    EmptyAssistantMessage,
    /// The same tool call id appears twice in one assistant message.
    #[error("tool call id `{0}` appears more than once")]
    DuplicateToolCallId(String),
    /// A tool result does not answer any pending tool call.
    #[error("tool result `{0}` does not answer a pending tool call")]
    UnexpectedToolResult(String),
    /// A non-tool message was appended while tool calls are unanswered.
    #[error("{0} tool call(s) are still waiting for results")]
    UnansweredToolCalls(usize),
}

/// Why a turn did not produce a final answer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    /// The backend request failed.
    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),
    /// The model kept requesting tools beyond the configured limit.
    #[error("the turn exceeded the limit of {max_turns} model requests")]
    TurnLimitExceeded {
        /// The configured limit.
        max_turns: usize,
    },
    /// The turn was cancelled by the caller.
    #[error("the turn was cancelled")]
    Cancelled,
    /// Another turn is still in progress; the input was not accepted.
    #[error("another turn is still in progress")]
    Busy,
    /// A message could not be appended to the history.
    #[error("invalid conversation history: {0}")]
    InvalidHistory(#[from] ConversationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_backend_errors() {
        let err = |kind, status| BackendError {
            kind,
            status,
            message: String::new(),
        };
        assert!(err(ErrorKind::RateLimitExceeded, Some(429)).is_transient());
        assert!(err(ErrorKind::Transport, None).is_transient());
        assert!(err(ErrorKind::Other, Some(503)).is_transient());
        assert!(!err(ErrorKind::Other, Some(400)).is_transient());
        assert!(!err(ErrorKind::Unauthorized, Some(401)).is_transient());
    }

    #[test]
    fn test_display() {
        let err = TurnError::from(BackendError {
            kind: ErrorKind::Other,
            status: Some(500),
            message: "backend returned status 500".to_owned(),
        });
        assert_eq!(
            err.to_string(),
            "backend request failed: backend failure: backend returned status 500"
        );
        assert_eq!(
            TurnError::TurnLimitExceeded { max_turns: 8 }.to_string(),
            "the turn exceeded the limit of 8 model requests"
        );
    }
}
