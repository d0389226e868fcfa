//! Configuration read from the environment.
//!
//! Credentials only ever come from here. Nothing is compiled in.

use std::env;
use std::time::Duration;

use pipe_agent_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use pipe_agent_sandbox::{EvalCapability, SandboxLimits};

use crate::service::ServiceConfig;

/// Error returned when the environment holds an unusable configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable is set to a value that cannot be used.
    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        /// Name of the variable.
        name: &'static str,
        /// The value found.
        value: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Everything the CLI needs to assemble a session.
#[derive(Clone, Debug)]
pub struct Config {
    /// The model backend.
    pub openai: OpenAIConfig,
    /// The auxiliary services, if a token is configured.
    pub service: Option<ServiceConfig>,
    /// Completion requests allowed per turn.
    pub max_turns: Option<usize>,
    /// Time limit of each tool call.
    pub tool_timeout: Option<Duration>,
    /// Whether and how expressions are evaluated.
    pub eval: EvalCapability,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let mut openai = OpenAIConfigBuilder::with_api_key(api_key);
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            openai = openai.with_base_url(base_url);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            openai = openai.with_model(model);
        }

        let service = get("AIPIPE_TOKEN").map(|token| {
            let config = ServiceConfig::with_token(token);
            match get("AIPIPE_BASE_URL") {
                Some(base_url) => config.with_base_url(base_url),
                None => config,
            }
        });

        let max_turns = get("PIPE_AGENT_MAX_TURNS")
            .map(|v| parse_positive("PIPE_AGENT_MAX_TURNS", v))
            .transpose()?
            .map(|n| n as usize);
        let tool_timeout = get("PIPE_AGENT_TOOL_TIMEOUT_MS")
            .map(|v| parse_positive("PIPE_AGENT_TOOL_TIMEOUT_MS", v))
            .transpose()?
            .map(Duration::from_millis);

        let eval = match get("PIPE_AGENT_EVAL").as_deref().map(str::trim) {
            None | Some("sandboxed") => {
                let mut limits = SandboxLimits::default();
                if let Some(v) = get("PIPE_AGENT_EVAL_TIMEOUT_MS") {
                    let millis = parse_positive("PIPE_AGENT_EVAL_TIMEOUT_MS", v)?;
                    limits = limits.with_timeout(Duration::from_millis(millis));
                }
                EvalCapability::SandboxedInterpreter(limits)
            }
            Some("disabled") => EvalCapability::Disabled,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PIPE_AGENT_EVAL",
                    value: other.to_owned(),
                    reason: "expected `disabled` or `sandboxed`",
                });
            }
        };

        Ok(Self {
            openai: openai.build(),
            service,
            max_turns,
            tool_timeout,
            eval,
        })
    }
}

fn parse_positive(name: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a positive integer",
        }),
    }
}
