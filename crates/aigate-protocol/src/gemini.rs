use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `generateContent`/`streamGenerateContent` request. Gemini has no
/// top-level `model` field in the body (it's in the path) and no top-level
/// `stream` flag (it's selected by the path suffix), so both are supplied
/// by the caller rather than parsed out of the JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: Option<String>,
    pub parts: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    pub prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_contents_and_keeps_generation_config_in_extra() {
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
            "generationConfig": {"temperature": 0.1},
        });
        let req: GenerateContentRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.contents.len(), 1);
        assert!(req.extra.contains_key("generationConfig"));
    }

    #[test]
    fn usage_metadata_defaults_candidates_to_zero() {
        let body = serde_json::json!({
            "usageMetadata": {"promptTokenCount": 10},
        });
        let resp: GenerateContentResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.usage_metadata.unwrap().candidates_token_count, 0);
    }
}
