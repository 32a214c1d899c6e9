//! Capabilities pipeline steps may invoke while reasoning: reading the uploaded document and
//! searching the web.

mod file_read;
pub(crate) mod schemas;
mod web_search;

pub use file_read::FileReadTool;
pub use web_search::{SearchResult, WebSearchTool};

use crate::llm::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by tool adapters.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// External provider failed or is not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Model supplied arguments the tool cannot use.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Whether the failure must abort the step instead of being reported back to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

/// Capability exposed to a pipeline step.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool with model-supplied arguments, returning text for the transcript.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;

    /// Advertisement sent to the completion backend.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// External capabilities a role may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Read the uploaded document.
    FileRead,
    /// Query the search provider.
    WebSearch,
}

/// Shared tool instances, built once and handed to the engine.
#[derive(Clone)]
pub struct ToolBox {
    file_read: Arc<dyn Tool>,
    web_search: Arc<dyn Tool>,
}

impl ToolBox {
    /// Assemble a toolbox from concrete adapters.
    pub fn new(file_read: Arc<dyn Tool>, web_search: Arc<dyn Tool>) -> Self {
        Self {
            file_read,
            web_search,
        }
    }

    /// Look up the adapter implementing a capability.
    pub fn get(&self, kind: ToolKind) -> Arc<dyn Tool> {
        match kind {
            ToolKind::FileRead => Arc::clone(&self.file_read),
            ToolKind::WebSearch => Arc::clone(&self.web_search),
        }
    }
}

/// Pull a required string argument out of a tool call.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}' parameter")))
}
