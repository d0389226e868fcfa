use std::borrow::Cow;
use std::fmt::{self, Display};

use serde_json::json;

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No tool with the requested name is registered.
    NotFound,
    /// The input provided to the tool was invalid.
    InvalidInput,
    /// Error occurred while executing the tool.
    ExecutionError,
    /// The tool was not allowed to execute.
    PermissionDenied,
    /// Evaluated code raised a fault.
    SandboxFault,
    /// The output could not be serialized.
    Serialization,
    /// An auxiliary backend the tool relies on failed.
    Backend,
    /// The tool did not finish in time.
    Timeout,
    /// The tool call was cancelled with its turn.
    Cancelled,
}

impl ErrorKind {
    /// Returns the stable identifier used in tool result payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::SandboxFault => "sandbox_fault",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Backend => "backend",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Tool not found"),
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::ExecutionError => write!(f, "Execution error"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::SandboxFault => write!(f, "Sandbox fault"),
            ErrorKind::Serialization => write!(f, "Serialization error"),
            ErrorKind::Backend => write!(f, "Backend error"),
            ErrorKind::Timeout => write!(f, "Timed out"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Describes a tool call error.
///
/// Tool errors never abort a turn. They are sent back to the model as
/// the tool result, see [`Error::to_content`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

macro_rules! constructors {
    ($($(#[$meta:meta])* $fn_name:ident => $kind:ident,)*) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $fn_name() -> Self {
                Self {
                    kind: ErrorKind::$kind,
                    reason: None,
                }
            }
        )*
    };
}

impl Error {
    constructors! {
        /// Creates a new error with the `NotFound` kind.
        not_found => NotFound,
        /// Creates a new error with the `InvalidInput` kind.
        invalid_input => InvalidInput,
        /// Creates a new error with the `ExecutionError` kind.
        execution_error => ExecutionError,
        /// Creates a new error with the `PermissionDenied` kind.
        permission_denied => PermissionDenied,
        /// Creates a new error with the `SandboxFault` kind.
        sandbox_fault => SandboxFault,
        /// Creates a new error with the `Serialization` kind.
        serialization => Serialization,
        /// Creates a new error with the `Backend` kind.
        backend => Backend,
        /// Creates a new error with the `Timeout` kind.
        timeout => Timeout,
        /// Creates a new error with the `Cancelled` kind.
        cancelled => Cancelled,
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }

    /// Renders the error as the content of a tool result message.
    pub fn to_content(&self) -> String {
        json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.reason(),
            }
        })
        .to_string()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}
