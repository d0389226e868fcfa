use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns the status code reported by the backend, if any.
    ///
    /// Errors that happen before a response is received (for example a
    /// refused connection) have no status.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// A type that represents a model provider, which is an entry for
/// sampling completions from a backend.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
///
/// Credentials are part of the provider's own configuration, which is
/// passed in when it is constructed. Nothing here reads ambient state.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Sends a request to the model and waits for the complete response.
    ///
    /// The returned future must be independent of `self` and cancel safe:
    /// dropping it abandons the request.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static;
}
