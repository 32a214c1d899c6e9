//! Chat-completion backend abstraction.
//!
//! Pipeline steps talk to the model exclusively through [`LlmClient`]. The production adapter
//! speaks the OpenAI chat-completions dialect, which Gemini, OpenAI, and most local runtimes
//! expose; tests substitute scripted clients.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while talking to the completion backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend could not be reached or the client could not be built.
    #[error("LLM backend unavailable: {0}")]
    Unavailable(String),
    /// Backend answered with a non-success status.
    #[error("LLM backend returned {status}: {body}")]
    Api {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body did not match the chat-completions schema.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Persona and standing instructions.
    System,
    /// Task prompt.
    User,
    /// Model turn, possibly carrying tool calls.
    Assistant,
    /// Result of a tool call, linked by `tool_call_id`.
    Tool,
}

/// Single message in a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Text content; assistant turns that only call tools carry none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool invocations requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Identifier of the call a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    /// Build an assistant turn that requested the given tool calls.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Build the reply to a tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned call identifier.
    pub id: String,
    /// Always `function` in the chat-completions dialect.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    /// Function name and JSON-encoded arguments.
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Function name plus raw argument JSON as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    pub arguments: String,
}

/// Tool advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Name the model uses to call the tool.
    pub name: String,
    /// Natural-language description shown to the model.
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

/// One request to the completion backend.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Full transcript so far.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call; empty forces a plain answer.
    pub tools: Vec<ToolSpec>,
}

/// Outcome of a completion call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Final text answer.
    Message(String),
    /// Model wants tools executed before answering.
    ToolCalls {
        /// Optional reasoning text emitted alongside the calls.
        content: Option<String>,
        /// Requested invocations, in order.
        calls: Vec<ToolCall>,
    },
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion over the supplied transcript.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}
