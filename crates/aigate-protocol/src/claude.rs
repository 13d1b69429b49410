use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anthropic Messages request, typed to the same minimal surface as the
/// OpenAI DTO: model, stream flag, message list. `max_tokens` is required
/// by the real API but the gateway core never inspects it, so it lives in
/// `extra` along with everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    pub usage: Option<MessagesUsage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Claude streams usage split across `message_start` (input_tokens) and
/// `message_delta` (output_tokens); the adapter accumulates both into one
/// `MessagesUsage` rather than the gateway core knowing this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart {
        message: MessagesResponse,
    },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<PartialUsage>,
        #[serde(flatten)]
        extra: serde_json::Map<String, Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialUsage {
    #[serde(default)]
    pub output_tokens: Option<u64>,
}
