use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use pipe_agent_model::{ModelProvider, ModelRequest, ModelResponse};
use tracing::Instrument;

use crate::error::BackendError;

type SendRequestResult = Result<ModelResponse, BackendError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(&ModelRequest) -> BoxedSendRequestFuture + Send + Sync
>;

/// How transient backend failures are retried.
///
/// Only failures for which [`BackendError::is_transient`] holds are
/// retried. Retrying stops at whichever limit is hit first: the number of
/// retries or the elapsed window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    max_elapsed: Duration,
    initial_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            max_elapsed: Duration::from_secs(20),
            initial_interval: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retries after the first attempt.
    #[inline]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the window after which no more retries are made.
    #[inline]
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Sets the delay before the first retry. Later delays grow
    /// exponentially.
    #[inline]
    pub fn with_initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }
}

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            trace!("got a request: {:?}", req);
            let fut = provider.send_request(req);
            Box::pin(
                async move {
                    let resp = fut.await.map_err(|err| {
                        error!("got an error: {err:?}");
                        BackendError::from_provider(&err)
                    })?;
                    trace!("finished a request: {:?}", resp.finish_reason);
                    Ok(resp)
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends a request and returns the response, retrying transient
    /// failures according to the retry policy.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the future abandons the
    /// in-flight attempt and any pending retry.
    pub async fn send_request(&self, req: &ModelRequest) -> SendRequestResult {
        let policy = self.retry_policy;
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(policy.initial_interval)
            .with_max_elapsed_time(Some(policy.max_elapsed))
            .build();

        let mut attempt = 0;
        let operation = || {
            attempt += 1;
            let this_attempt = attempt;
            let fut = (self.handler_fn)(req);
            async move {
                fut.await.map_err(|err| {
                    if err.is_transient() && this_attempt <= policy.max_retries {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        };
        let notify = |err: BackendError, delay: Duration| {
            warn!("retrying in {}ms after: {err}", delay.as_millis());
        };
        backoff::future::retry_notify(backoff, operation, notify).await
    }
}
