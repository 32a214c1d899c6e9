use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient};
use crate::pipeline::types::AgentProfile;
use crate::tools::{Tool, ToolError, required_str, schemas};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Lets a role hand a self-contained question to a coworker.
///
/// The coworker answers in one backend call with no tools, so delegation never recurses.
pub struct DelegateTool {
    llm: Arc<dyn LlmClient>,
    coworkers: Vec<AgentProfile>,
    description: String,
}

impl DelegateTool {
    /// Build the tool for a delegating role; `coworkers` must exclude the caller.
    pub fn new(llm: Arc<dyn LlmClient>, coworkers: Vec<AgentProfile>) -> Self {
        let names: Vec<&str> = coworkers.iter().map(|agent| agent.role.as_str()).collect();
        let description = format!(
            "Delegate a specific task to one of the following coworkers: {}. Provide all \
             necessary context; the coworker knows nothing about your task otherwise.",
            names.join(", ")
        );
        Self {
            llm,
            coworkers,
            description,
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate_work"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let names: Vec<&str> = self
            .coworkers
            .iter()
            .map(|agent| agent.role.as_str())
            .collect();
        schemas::object_schema(&[
            ("coworker", schemas::enum_schema("Role to delegate to", &names)),
            ("task", schemas::string_schema("The question or task to hand over")),
            (
                "context",
                schemas::string_schema("Everything the coworker needs to know to answer"),
            ),
        ])
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let coworker = required_str(&args, "coworker")?;
        let task = required_str(&args, "task")?;
        let context = args.get("context").and_then(Value::as_str).unwrap_or("");

        let agent = self
            .coworkers
            .iter()
            .find(|agent| agent.role.eq_ignore_ascii_case(coworker))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("unknown coworker '{coworker}'"))
            })?;
        tracing::debug!(coworker = %agent.role, "Delegating work");

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(format!(
                    "You are {}. {}\nYour personal goal is: {}",
                    agent.role, agent.backstory, agent.goal
                )),
                ChatMessage::user(format!(
                    "{task}\n\nThis is the context you are working with:\n{context}"
                )),
            ],
            tools: Vec::new(),
        };

        match self.llm.complete(request).await {
            Ok(Completion::Message(text)) if !text.trim().is_empty() => Ok(text),
            Ok(_) => Err(ToolError::InvalidArguments(format!(
                "{} returned no answer",
                agent.role
            ))),
            Err(error) => Err(ToolError::ServiceUnavailable(error.to_string())),
        }
    }
}
