use std::time::Duration;

use pipe_agent_core::{
    Agent, AgentBuilder, AgentEvent, RetryPolicy, TurnError, TurnOutcome,
};
use pipe_agent_model::{ModelMessage, ModelProvider};
use pipe_agent_sandbox::{EvalCapability, SandboxEvaluator};

use crate::service::{ServiceClient, ServiceConfig};
use crate::tools::*;

/// The system prompt used unless another one is set.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    system_prompt: String,
    service: Option<ServiceConfig>,
    eval: EvalCapability,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            service: None,
            eval: EvalCapability::Disabled,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Enables the tools backed by the auxiliary services.
    #[inline]
    pub fn with_service(mut self, config: ServiceConfig) -> Self {
        self.service = Some(config);
        self
    }

    /// Sets whether and how the model may evaluate expressions.
    ///
    /// Evaluation is disabled by default.
    #[inline]
    pub fn with_eval_capability(mut self, eval: EvalCapability) -> Self {
        self.eval = eval;
        self
    }

    /// Sets how many completion requests one turn may make.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_turns(max_turns);
        self
    }

    /// Sets the time limit of each tool call.
    #[inline]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.agent_builder = self.agent_builder.with_tool_timeout(timeout);
        self
    }

    /// Sets how transient backend failures are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.agent_builder = self.agent_builder.with_retry_policy(retry_policy);
        self
    }

    /// Attaches a callback to be invoked for every event of a turn.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_event(on_event);
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_idle(on_idle);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let Self {
            mut agent_builder,
            system_prompt,
            service,
            eval,
        } = self;

        agent_builder = agent_builder.with_system_prompt(system_prompt);
        if eval == EvalCapability::Disabled {
            info!("expression evaluation is disabled");
        } else {
            agent_builder = agent_builder
                .with_tool(EvaluateExpressionTool::new(SandboxEvaluator::new(eval)));
        }
        match service {
            Some(config) => {
                let client = ServiceClient::new(config);
                agent_builder = agent_builder
                    .with_tool(WebSearchTool::new(client.clone()))
                    .with_tool(RunPipeTool::new(client));
            }
            None => info!("no service token, web search and pipes are unavailable"),
        }

        Session {
            agent: agent_builder.build(),
        }
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session holds a fully configured agent that you can use directly,
/// and it is basically a wrapper around [`Agent`].
#[derive(Clone)]
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Sends a message to the session and runs the turn it starts.
    ///
    /// Fails with [`TurnError::Busy`] if a turn is already running.
    #[inline]
    pub async fn send_message(
        &self,
        message: &str,
    ) -> Result<TurnOutcome, TurnError> {
        self.agent.submit(message).await
    }

    /// Cancels the running turn, if any.
    #[inline]
    pub fn cancel_turn(&self) {
        self.agent.cancel_turn();
    }

    /// Returns a copy of the conversation so far.
    #[inline]
    pub async fn history(&self) -> Vec<ModelMessage> {
        self.agent.history().await
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}
