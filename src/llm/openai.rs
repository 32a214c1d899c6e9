//! Adapter for OpenAI-compatible `/chat/completions` endpoints.

use crate::config::LlmSettings;
use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, LlmError, ToolCall};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Chat-completions client bound to a single model and temperature.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    /// Build a client from configuration.
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("fin-analyzer/0.1")
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|error| {
                LlmError::Unavailable(format!("failed to construct HTTP client: {error}"))
            })?;
        tracing::debug!(
            url = %settings.base_url,
            model = %settings.model,
            temperature = settings.temperature,
            "Initialized chat-completions client"
        );
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": request.messages,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = self.build_body(&request);
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                LlmError::Unavailable(format!("failed to reach {}: {error}", self.base_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = LlmError::Api { status, body };
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                tracing::error!(error = %error, "Backend rejected credentials");
            } else {
                tracing::warn!(error = %error, "Completion request failed");
            }
            return Err(error);
        }

        let payload: ChatCompletionResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;
        let message = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".into()))?;

        Ok(into_completion(message))
    }
}

fn into_completion(message: ChatMessage) -> Completion {
    let calls: Vec<ToolCall> = message.tool_calls.unwrap_or_default();
    if calls.is_empty() {
        Completion::Message(message.content.unwrap_or_default().trim().to_string())
    } else {
        Completion::ToolCalls {
            content: message.content.filter(|text| !text.trim().is_empty()),
            calls,
        }
    }
}
