//! A set of built-in tools that models can use.

mod evaluate;
mod pipe;
mod search;

pub use evaluate::EvaluateExpressionTool;
pub use pipe::RunPipeTool;
pub use search::WebSearchTool;
