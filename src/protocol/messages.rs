//! OpenAI-compatible chat completion messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MODEL_NAME, ToolDescriptor};
use crate::tool::ToolResult;
use crate::{Error, Result};

/// `POST /messages` request body. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Requested model, echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Deliver the answer as an SSE stream
    #[serde(default)]
    pub stream: bool,
}

/// One chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, `assistant` or `tool`
    pub role: String,
    /// Plain string or an array of content parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    /// Text of the message; content parts of type `text` are concatenated
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => {
                let text: Vec<&str> = parts
                    .iter()
                    .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect();
                if text.is_empty() { None } else { Some(text.join("")) }
            }
            _ => None,
        }
    }
}

/// Tool call inside an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Always `function`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Target
    pub function: FunctionCall,
}

/// Function name and arguments of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name
    pub name: String,
    /// Arguments as a JSON-encoded string or an object
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as a JSON value, decoding the string form
    pub fn parsed_arguments(&self) -> Result<Value> {
        match &self.arguments {
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => serde_json::from_str(s).map_err(|e| {
                Error::Protocol(format!("Invalid arguments for '{}': {e}", self.name))
            }),
            other => Ok(other.clone()),
        }
    }
}

/// Non-streaming chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Completion id (`chatcmpl-<uuid>`)
    pub id: String,
    /// Always `chat.completion`
    pub object: String,
    /// Unix timestamp
    pub created: i64,
    /// Model name
    pub model: String,
    /// Single choice
    pub choices: Vec<Choice>,
    /// Structured result of the tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    /// Catalogue, for discovery requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
}

/// Completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index
    pub index: u32,
    /// Assistant message
    pub message: AssistantMessage,
    /// Always `stop`
    pub finish_reason: String,
}

/// Assistant reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Always `assistant`
    pub role: String,
    /// Serialized payload
    pub content: String,
}

/// Streaming chat completion chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion id
    pub id: String,
    /// Always `chat.completion.chunk`
    pub object: String,
    /// Unix timestamp
    pub created: i64,
    /// Model name
    pub model: String,
    /// Single delta
    pub choices: Vec<ChunkChoice>,
    /// Structured result of the tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    /// Catalogue, for discovery requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
}

/// Streaming choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index
    pub index: u32,
    /// Delta message
    pub delta: AssistantMessage,
    /// `stop` on the terminal chunk
    pub finish_reason: Option<String>,
}

/// Payload of a chat completion
#[derive(Debug, Clone)]
pub enum CompletionPayload {
    /// Discovery answer
    Tools(Vec<ToolDescriptor>),
    /// Invocation answer
    Result(ToolResult),
}

impl CompletionPayload {
    /// JSON text carried in the message content
    #[must_use]
    pub fn to_content(&self) -> String {
        let encoded = match self {
            Self::Tools(tools) => serde_json::to_string(tools),
            Self::Result(result) => serde_json::to_string(result),
        };
        encoded.unwrap_or_default()
    }
}

impl ChatCompletion {
    /// Completion carrying `payload`
    #[must_use]
    pub fn new(model: Option<&str>, payload: CompletionPayload) -> Self {
        let content = payload.to_content();
        let (tools, tool_result) = split(payload);
        Self {
            id: completion_id(),
            object: "chat.completion".into(),
            created: chrono::Utc::now().timestamp(),
            model: model.unwrap_or(MODEL_NAME).to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".into(),
                    content,
                },
                finish_reason: "stop".into(),
            }],
            tool_result,
            tools,
        }
    }

    /// Same completion as a single terminal chunk
    #[must_use]
    pub fn into_chunk(self) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id,
            object: "chat.completion.chunk".into(),
            created: self.created,
            model: self.model,
            choices: self
                .choices
                .into_iter()
                .map(|c| ChunkChoice {
                    index: c.index,
                    delta: c.message,
                    finish_reason: Some(c.finish_reason),
                })
                .collect(),
            tool_result: self.tool_result,
            tools: self.tools,
        }
    }
}

fn split(payload: CompletionPayload) -> (Option<Vec<ToolDescriptor>>, Option<ToolResult>) {
    match payload {
        CompletionPayload::Tools(tools) => (Some(tools), None),
        CompletionPayload::Result(result) => (None, Some(result)),
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// OpenAI-style error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error body
    pub error: ApiError,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Message
    pub message: String,
    /// `invalid_request_error` or `server_error`
    #[serde(rename = "type")]
    pub kind: String,
}

impl ApiErrorResponse {
    /// Client error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }

    /// Server error
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(message, "server_error")
    }

    fn new(message: impl Into<String>, kind: &str) -> Self {
        Self {
            error: ApiError {
                message: message.into(),
                kind: kind.to_string(),
            },
        }
    }
}
