//! Executes one pipeline step against the completion backend.
//!
//! A step is a conversation: a system message carrying the role's persona, a user message
//! carrying the rendered task plus upstream context, and then up to `max_iter` backend calls in
//! which the model may request tools. Once the budget is spent the model is asked for its final
//! answer with tools withdrawn.

use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolCall};
use crate::pipeline::delegation::DelegateTool;
use crate::pipeline::types::{
    AgentProfile, PipelineError, PipelineRequest, StepDefinition, StepOutput,
};
use crate::tools::{Tool, ToolBox};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

const FINAL_ANSWER_NUDGE: &str = "You have reached the limit of tool usage for this task. \
    Using only the information gathered so far, give your complete final answer now.";

/// Generic executor shared by every step.
pub struct StepAgent {
    llm: Arc<dyn LlmClient>,
    tools: ToolBox,
}

impl StepAgent {
    /// Bind the executor to a backend and the shared tool adapters.
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolBox) -> Self {
        Self { llm, tools }
    }

    /// Run `step` to completion and return its final answer.
    ///
    /// `context` holds the outputs of the step's declared dependencies, in declaration order.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        request: &PipelineRequest,
        context: &[&StepOutput],
        roster: &[AgentProfile],
    ) -> Result<String, PipelineError> {
        let tools = self.tools_for(&step.agent, roster);
        let specs = tools.iter().map(|tool| tool.spec()).collect::<Vec<_>>();
        let mut messages = vec![
            ChatMessage::system(system_prompt(&step.agent, roster)),
            ChatMessage::user(task_prompt(step, request, context)),
        ];

        for iteration in 1..=step.agent.max_iter {
            let completion = self
                .llm
                .complete(CompletionRequest {
                    messages: messages.clone(),
                    tools: specs.clone(),
                })
                .await
                .map_err(|source| PipelineError::Backend {
                    step: step.id,
                    source,
                })?;

            match completion {
                Completion::Message(text) => {
                    tracing::debug!(step = %step.id, iteration, "Step produced final answer");
                    return non_empty(step, text);
                }
                Completion::ToolCalls { content, calls } => {
                    tracing::debug!(
                        step = %step.id,
                        iteration,
                        calls = calls.len(),
                        "Model requested tools"
                    );
                    messages.push(ChatMessage::assistant_tool_calls(content, calls.clone()));
                    for call in &calls {
                        let result = self.invoke(step, &tools, call).await?;
                        messages.push(ChatMessage::tool_result(&call.id, result));
                    }
                }
            }
        }

        tracing::debug!(
            step = %step.id,
            max_iter = step.agent.max_iter,
            "Iteration budget spent; forcing final answer"
        );
        messages.push(ChatMessage::user(FINAL_ANSWER_NUDGE));
        let completion = self
            .llm
            .complete(CompletionRequest {
                messages,
                tools: Vec::new(),
            })
            .await
            .map_err(|source| PipelineError::Backend {
                step: step.id,
                source,
            })?;

        match completion {
            Completion::Message(text) => non_empty(step, text),
            Completion::ToolCalls { .. } => Err(PipelineError::IterationBudget {
                step: step.id,
                max_iter: step.agent.max_iter,
            }),
        }
    }

    fn tools_for(&self, agent: &AgentProfile, roster: &[AgentProfile]) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> =
            agent.tools.iter().map(|kind| self.tools.get(*kind)).collect();
        if agent.allow_delegation {
            let coworkers = coworkers_of(agent, roster);
            if !coworkers.is_empty() {
                tools.push(Arc::new(DelegateTool::new(Arc::clone(&self.llm), coworkers)));
            }
        }
        tools
    }

    async fn invoke(
        &self,
        step: &StepDefinition,
        tools: &[Arc<dyn Tool>],
        call: &ToolCall,
    ) -> Result<String, PipelineError> {
        let name = call.function.name.as_str();
        let Some(tool) = tools.iter().find(|tool| tool.name() == name) else {
            tracing::warn!(step = %step.id, tool = name, "Model called a tool it was not given");
            return Ok(format!("Error: tool '{name}' is not available for this task."));
        };

        let args = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(message) => return Ok(format!("Error: {message}")),
        };

        match tool.execute(args).await {
            Ok(output) => {
                tracing::debug!(
                    step = %step.id,
                    tool = name,
                    bytes = output.len(),
                    "Tool call succeeded"
                );
                Ok(output)
            }
            Err(error) if error.is_fatal() => {
                tracing::error!(step = %step.id, tool = name, error = %error, "Tool call failed");
                Err(PipelineError::Tool {
                    step: step.id,
                    tool: name.to_string(),
                    source: error,
                })
            }
            Err(error) => {
                tracing::debug!(step = %step.id, tool = name, error = %error, "Tool call rejected");
                Ok(format!("Error: {error}"))
            }
        }
    }
}

fn non_empty(step: &StepDefinition, text: String) -> Result<String, PipelineError> {
    if text.trim().is_empty() {
        Err(PipelineError::EmptyOutput(step.id))
    } else {
        Ok(text)
    }
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("tool arguments must be a JSON object".to_string()),
        Err(error) => Err(format!("tool arguments are not valid JSON: {error}")),
    }
}

fn coworkers_of(agent: &AgentProfile, roster: &[AgentProfile]) -> Vec<AgentProfile> {
    roster
        .iter()
        .filter(|candidate| candidate.role != agent.role)
        .cloned()
        .collect()
}

fn system_prompt(agent: &AgentProfile, roster: &[AgentProfile]) -> String {
    let mut prompt = format!(
        "You are {}. {}\nYour personal goal is: {}",
        agent.role, agent.backstory, agent.goal
    );
    if agent.allow_delegation {
        let coworkers = coworkers_of(agent, roster);
        if !coworkers.is_empty() {
            let names: Vec<&str> = coworkers.iter().map(|c| c.role.as_str()).collect();
            let _ = write!(
                prompt,
                "\nYou work alongside these coworkers and may delegate to them: {}.",
                names.join(", ")
            );
        }
    }
    prompt
}

fn task_prompt(
    step: &StepDefinition,
    request: &PipelineRequest,
    context: &[&StepOutput],
) -> String {
    let mut prompt = format!("Current Task: {}\n", step.render_description(request));
    let _ = write!(
        prompt,
        "\nThis is the expected criteria for your final answer: {}\n\
         You MUST return the actual complete content as the final answer, not a summary.\n",
        step.expected_output
    );
    if !context.is_empty() {
        prompt.push_str("\nThis is the context you're working with:\n");
        for output in context {
            let _ = write!(
                prompt,
                "\n### Output of '{}' ({})\n{}\n",
                output.step, output.role, output.text
            );
        }
    }
    prompt
}
