use crate::domain::error::ModelError;
use crate::domain::models::*;
use crate::domain::ports::ModelAdapter;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIAdapter {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key, base_url)
    }

    pub fn with_client(client: Client, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &OpenAIRequest) -> Result<Response, ModelError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "AI service returned an error");
        Err(ModelError::Http {
            status: status.as_u16(),
            message: error_message(status, &text),
        })
    }
}

// --- Request Structs ---

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

impl OpenAIRequest {
    fn new(req: ChatRequest, stream: bool) -> Self {
        let tools = req.tools.filter(|tools| !tools.is_empty());
        Self {
            model: req.model_id.0,
            messages: req.messages.into_iter().map(OpenAIMessage::from).collect(),
            temperature: req.temperature,
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
            stream: stream.then_some(true),
        }
    }
}

/// Chat message in the provider's wire shape. Also accepted inbound from
/// clients of the trainer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub type_: String,
    pub function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(tc: &ToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            type_: function_type(),
            function: OpenAIFunctionCall {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            },
        }
    }
}

impl From<OpenAIToolCall> for ToolCall {
    fn from(tc: OpenAIToolCall) -> Self {
        Self {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        }
    }
}

impl From<Message> for OpenAIMessage {
    fn from(m: Message) -> Self {
        Self {
            role: m.role,
            content: m.content,
            tool_calls: m
                .tool_calls
                .map(|tcs| tcs.iter().map(OpenAIToolCall::from).collect()),
            tool_call_id: m.tool_call_id,
            name: m.name,
        }
    }
}

impl From<OpenAIMessage> for Message {
    fn from(m: OpenAIMessage) -> Self {
        Self {
            role: m.role,
            content: m.content,
            tool_calls: m
                .tool_calls
                .map(|tcs| tcs.into_iter().map(ToolCall::from).collect()),
            tool_call_id: m.tool_call_id,
            name: m.name,
        }
    }
}

// --- Response Structs ---

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

// --- Stream Response Structs ---

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Deserialize, Clone)]
struct OpenAIToolCallDelta {
    index: i32,
    id: Option<String>,
    function: Option<OpenAIFunctionCallDelta>,
}

#[derive(Deserialize, Clone)]
struct OpenAIFunctionCallDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Reassembles tool calls that arrive split across stream chunks.
#[derive(Default)]
struct ToolCallAccumulator {
    // Index -> (id, name, args)
    calls: HashMap<i32, (String, String, String)>,
}

impl ToolCallAccumulator {
    fn push(&mut self, deltas: &[OpenAIToolCallDelta]) {
        for tc in deltas {
            let entry = self
                .calls
                .entry(tc.index)
                .or_insert((String::new(), String::new(), String::new()));
            if let Some(id) = &tc.id {
                entry.0 = id.clone();
            }
            if let Some(func) = &tc.function {
                if let Some(name) = &func.name {
                    entry.1.push_str(name);
                }
                if let Some(args) = &func.arguments {
                    entry.2.push_str(args);
                }
            }
        }
    }

    fn finish(self) -> Option<Vec<ToolCall>> {
        if self.calls.is_empty() {
            return None;
        }

        // Sort by index to maintain order
        let mut calls: Vec<_> = self.calls.into_iter().collect();
        calls.sort_by_key(|(k, _)| *k);

        Some(
            calls
                .into_iter()
                .map(|(_, (id, name, arguments))| ToolCall { id, name, arguments })
                .collect(),
        )
    }
}

/// Best human-readable message from a non-2xx provider body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("API error: {}", status.as_u16())
    } else {
        body.to_string()
    }
}

#[async_trait]
impl ModelAdapter for OpenAIAdapter {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let request_body = OpenAIRequest::new(req, false);
        let response = self.send(&request_body).await?;

        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .map(|tcs| tcs.into_iter().map(ToolCall::from).collect::<Vec<_>>());

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            role: Role::Assistant,
            tool_calls,
        })
    }

    async fn stream(&self, req: ChatRequest, tx: Sender<String>) -> Result<ChatResponse, ModelError> {
        let request_body = OpenAIRequest::new(req, true);
        let response = self.send(&request_body).await?;

        let mut accumulated_content = String::new();
        let mut tool_calls = ToolCallAccumulator::default();
        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| ModelError::Transport(e.to_string()))?;
            if event.data == "[DONE]" {
                break;
            }

            let chunk = match serde_json::from_str::<OpenAIStreamResponse>(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable stream chunk");
                    continue;
                }
            };

            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = &choice.delta.content {
                    accumulated_content.push_str(content);
                    // The receiver may be gone if the client disconnected
                    let _ = tx.send(content.clone()).await;
                }
                if let Some(deltas) = &choice.delta.tool_calls {
                    tool_calls.push(deltas);
                }
            }
        }

        Ok(ChatResponse {
            content: accumulated_content,
            role: Role::Assistant,
            tool_calls: tool_calls.finish(),
        })
    }
}
