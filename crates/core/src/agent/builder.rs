use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipe_agent_model::{ModelProvider, ToolChoice};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;

use super::{Agent, AgentEvent, AgentInner, AgentStage, EventFn, IdleFn};
use crate::conversation::Conversation;
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{Tool, ToolInvoker, ToolRegistry};

const DEFAULT_MAX_TURNS: usize = 8;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    tool_choice: ToolChoice,
    max_turns: usize,
    tool_timeout: Duration,
    on_event: Option<EventFn>,
    on_idle: Option<IdleFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: None,
            tools: ToolRegistry::new(),
            tool_choice: ToolChoice::Auto,
            max_turns: DEFAULT_MAX_TURNS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            on_event: None,
            on_idle: None,
        }
    }

    /// Seeds the conversation with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    ///
    /// Tool names are unique. A tool whose name is already taken is
    /// ignored, and the first registration stays in effect.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        if let Err(err) = self.tools.register(tool) {
            warn!("ignoring tool: {err}");
        }
        self
    }

    /// Sets how many completion requests one turn may make. Defaults to 8,
    /// and is at least 1.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Sets the time limit of each tool call. Defaults to 30 seconds.
    #[inline]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Sets how the model may pick tools. Defaults to
    /// [`ToolChoice::Auto`].
    #[inline]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Sets how transient backend failures are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.model_client = self.model_client.with_retry_policy(retry_policy);
        self
    }

    /// Attaches a callback to be invoked for every [`AgentEvent`].
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            system_prompt,
            tools,
            tool_choice,
            max_turns,
            tool_timeout,
            on_event,
            on_idle,
        } = self;

        let conversation = match system_prompt {
            Some(prompt) => Conversation::with_system_prompt(prompt),
            None => Conversation::new(),
        };
        let invoker = ToolInvoker::new(Arc::new(tools), tool_timeout);
        let tool_specs = invoker.registry().list_specs();
        debug!(
            "building an agent with {} tools, max_turns = {max_turns}",
            tool_specs.len()
        );
        let (stage, _) = watch::channel(AgentStage::default());

        Agent {
            inner: Arc::new(AgentInner {
                model_client,
                invoker,
                tool_specs,
                tool_choice,
                max_turns,
                conversation: AsyncMutex::new(conversation),
                cancel: Mutex::new(CancellationToken::new()),
                stage,
                on_event,
                on_idle,
            }),
        }
    }
}
