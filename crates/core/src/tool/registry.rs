use std::collections::BTreeMap;
use std::sync::Arc;

use pipe_agent_model::ModelTool;
use serde_json::Value;

use super::object::{ToolFuture, ToolObject, ToolObjectImpl};
use super::{Error, Tool, ToolContext, ToolResult};

/// Returned when registering a tool whose name is already taken.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("a tool named `{0}` is already registered")]
pub struct DuplicateToolError(pub String);

/// The set of tools available to the model, keyed by name.
///
/// Dispatching does no validation beyond finding the tool; each tool
/// checks its own arguments.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolObject>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Names are unique; registering a second tool with
    /// the same name fails and keeps the first one.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), DuplicateToolError> {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(DuplicateToolError(name));
        }
        self.tools.insert(name, Arc::new(ToolObjectImpl(tool)));
        Ok(())
    }

    /// Returns the declarations of all tools, ordered by name.
    pub fn list_specs(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Returns `true` if a tool with this name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Starts the named tool with the given arguments.
    ///
    /// The returned future is independent of the registry. An unknown name
    /// resolves to an error of kind [`NotFound`](super::ErrorKind::NotFound).
    pub fn dispatch(&self, name: &str, arguments: Value, ctx: ToolContext) -> ToolFuture {
        let Some(tool) = self.tools.get(name) else {
            warn!("tool not found: {name}");
            let err = Error::not_found().with_reason(format!("tool `{name}` not found"));
            return Box::pin(std::future::ready(ToolResult::Err(err)));
        };
        tool.execute(arguments, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::sync::LazyLock;

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::tool::ErrorKind;

    static SCHEMA: LazyLock<Value> = LazyLock::new(|| {
        json!({
            "type": "object",
            "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
            "required": ["a", "b"]
        })
    });

    #[derive(Deserialize)]
    struct AddInput {
        a: f64,
        b: f64,
    }

    #[derive(Serialize)]
    struct AddOutput {
        sum: f64,
    }

    struct AddTool;

    impl Tool for AddTool {
        type Input = AddInput;
        type Output = AddOutput;

        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Adds two numbers."
        }

        fn parameter_schema(&self) -> &Value {
            &SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
            _ctx: ToolContext,
        ) -> impl Future<Output = Result<Self::Output, Error>> + Send + 'static
        {
            ready(Ok(AddOutput {
                sum: input.a + input.b,
            }))
        }
    }

    struct EchoTool;

    impl Tool for EchoTool {
        type Input = Value;
        type Output = String;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the call id."
        }

        fn parameter_schema(&self) -> &Value {
            &SCHEMA
        }

        fn execute(
            &self,
            _input: Self::Input,
            ctx: ToolContext,
        ) -> impl Future<Output = Result<Self::Output, Error>> + Send + 'static
        {
            ready(Ok(ctx.call_id().to_owned()))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("call_1", CancellationToken::new())
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry.register(AddTool).unwrap();

        let names: Vec<_> = registry.list_specs().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["add", "echo"]);

        let result = registry.dispatch("add", json!({ "a": 2, "b": 40 }), ctx()).await;
        assert_eq!(result.unwrap(), "{\n  \"sum\": 42.0\n}");

        // Strings are sent verbatim.
        let result = registry.dispatch("echo", json!({}), ctx()).await;
        assert_eq!(result.unwrap(), "call_1");
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(AddTool).unwrap();

        let err = registry
            .dispatch("nonexistent", json!({}), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.reason().contains("nonexistent"));

        let err = registry
            .dispatch("add", json!({ "a": 1 }), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.reason().contains("missing field `b`"));

        let err = registry
            .dispatch("add", json!("{\"a\": 1,"), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(AddTool).unwrap();
        assert_eq!(
            registry.register(AddTool),
            Err(DuplicateToolError("add".to_owned()))
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("add"));
    }
}
