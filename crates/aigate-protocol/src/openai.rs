use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The chat-completions request body, typed only as far as the gateway core
/// needs: which model, whether the caller wants a stream, and the message
/// list for size accounting. Every other OpenAI field (tools, response
/// format, sampling params, ...) is forwarded untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    /// Untyped: OpenAI allows both plain strings and content-part arrays.
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub usage: Option<ChatCompletionUsage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One `data:` frame of a streamed chat completion. Only `usage` (present
/// on the final chunk when `stream_options.include_usage` is set) is
/// pulled out; the rest rides through as `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_fields_and_keeps_rest_in_extra() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "tools": [],
        });
        let req: ChatCompletionRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.model, "gpt-4o-mini");
        assert!(req.stream);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.extra.get("temperature").unwrap(), &serde_json::json!(0.2));
        assert!(req.extra.get("model").is_none());
    }

    #[test]
    fn stream_defaults_to_false() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [],
        });
        let req: ChatCompletionRequest = serde_json::from_value(body).unwrap();
        assert!(!req.stream);
    }
}
