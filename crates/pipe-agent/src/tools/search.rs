use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::tool::{Error as ToolError, Tool, ToolContext};
use crate::service::ServiceClient;

const ENDPOINT: &str = "proxy/google_search";
const MAX_RESULTS: usize = 5;
const NO_RESULTS: &str = "No results found.";

#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The search query.")]
    query: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    title: String,
    snippet: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SearchOutput {
    Results(Vec<SearchResult>),
    Empty(&'static str),
}

/// A tool for searching the web through the search proxy service.
pub struct WebSearchTool {
    client: ServiceClient,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a new web search tool.
    #[inline]
    pub fn new(client: ServiceClient) -> Self {
        WebSearchTool {
            client,
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;
    type Output = SearchOutput;

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web and returns the titles and snippets of the top results."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
        _ctx: ToolContext,
    ) -> impl Future<Output = Result<Self::Output, ToolError>> + Send + 'static
    {
        let query = input.query.trim().to_owned();
        let fut = (!query.is_empty())
            .then(|| self.client.post_json(ENDPOINT, &json!({ "query": query })));
        async move {
            let Some(fut) = fut else {
                return Err(ToolError::invalid_input()
                    .with_reason("`query` must not be empty"));
            };
            Ok(summarize(&fut.await?))
        }
    }
}

/// Keeps the title and snippet of the first few result items.
fn summarize(reply: &Value) -> SearchOutput {
    let text = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let results: Vec<_> = reply
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .take(MAX_RESULTS)
        .map(|item| SearchResult {
            title: text(item, "title"),
            snippet: text(item, "snippet"),
        })
        .collect();
    if results.is_empty() {
        SearchOutput::Empty(NO_RESULTS)
    } else {
        SearchOutput::Results(results)
    }
}
