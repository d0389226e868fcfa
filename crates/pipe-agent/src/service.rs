//! Client for the auxiliary services the built-in tools call.
//!
//! Every service is a single JSON request and response, addressed by an
//! endpoint path below a shared base URL and authorized with a bearer
//! token.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use mime::Mime;
use reqwest::{Client, header};
use serde_json::Value;

use crate::core::tool::Error as ToolError;

const DEFAULT_BASE_URL: &str = "https://aipipe.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_EXCERPT: usize = 200;

/// Configuration of the auxiliary services.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceConfig {
    token: String,
    base_url: String,
    timeout: Duration,
}

impl ServiceConfig {
    /// Creates a configuration with the given bearer token and the default
    /// base URL.
    #[inline]
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Sets the timeout of each request.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A failed call to an auxiliary service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolBackendError {
    /// The HTTP status, if the service answered at all.
    pub status: Option<u16>,
    /// A human readable description.
    pub message: String,
}

impl ToolBackendError {
    fn new<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(None, "request timed out")
        } else {
            Self::new(None, format!("request failed: {err}"))
        }
    }
}

impl From<ToolBackendError> for ToolError {
    fn from(err: ToolBackendError) -> Self {
        ToolError::backend().with_reason(err.message)
    }
}

/// Sends requests to the auxiliary services.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: Client,
    config: Arc<ServiceConfig>,
}

impl ServiceClient {
    /// Creates a client with the given configuration.
    #[inline]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration in use.
    #[inline]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Posts `payload` to `endpoint` and returns the decoded JSON reply.
    ///
    /// The returned future borrows neither `self` nor the arguments.
    pub fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<Value, ToolBackendError>> + Send + use<>
    {
        let url = self.config.endpoint_url(endpoint);
        debug!("posting to {url}");
        let resp_fut = self
            .client
            .post(url)
            .bearer_auth(&self.config.token)
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.timeout)
            .json(payload)
            .send();

        async move {
            let resp = resp_fut.await.map_err(ToolBackendError::from_transport)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!("service returned status {status}");
                return Err(ToolBackendError::new(
                    Some(status.as_u16()),
                    format!(
                        "service returned status {}: {}",
                        status.as_u16(),
                        excerpt(&body)
                    ),
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            if !is_json(content_type.as_deref()) {
                return Err(ToolBackendError::new(
                    Some(status.as_u16()),
                    format!("unexpected content type: {content_type:?}"),
                ));
            }

            let body = resp.bytes().await.map_err(ToolBackendError::from_transport)?;
            serde_json::from_slice(&body).map_err(|err| {
                ToolBackendError::new(
                    Some(status.as_u16()),
                    format!("malformed reply: {err}"),
                )
            })
        }
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|v| v.parse::<Mime>().ok())
        .is_some_and(|m| {
            m.type_() == mime::APPLICATION
                && (m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
        })
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
