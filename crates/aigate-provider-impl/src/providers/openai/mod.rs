use std::time::Instant;

use aigate_protocol::openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use aigate_provider_core::{
    Adapter, ChunkEvent, ChunkSink, ExecuteOutcome, Health, ProviderError, ProviderResult,
    StreamCompletion,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::http::{drive_sse_stream, send_json};

/// Adapter for the OpenAI chat-completions family. Grounded on the
/// teacher's `OpenAIProvider`: base URL + bearer credential resolved once
/// at construction, `build_url` joins it with the fixed operation path.
pub struct OpenAiAdapter {
    name: String,
    client: wreq::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(name: impl Into<String>, client: wreq::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn chat_completions_url(&self) -> String {
        build_url(&self.base_url, "/v1/chat/completions")
    }
}

pub fn build_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
    ) -> ProviderResult<ExecuteOutcome> {
        let mut request: ChatCompletionRequest = serde_json::from_value(request_body)
            .map_err(|err| ProviderError::BadRequest(err.to_string()))?;
        request.model = upstream_model.to_string();
        request.stream = false;

        let http_request = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .json(&request);

        let (status, body) = send_json(&self.client, http_request, deadline).await?;
        let response: ChatCompletionResponse =
            serde_json::from_value(body).map_err(|err| ProviderError::Transport(err.to_string()))?;
        let usage = response.usage.clone().unwrap_or(aigate_protocol::openai::ChatCompletionUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });

        Ok(ExecuteOutcome {
            body: serde_json::to_value(&response).unwrap_or(Value::Null),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            upstream_status: status,
        })
    }

    async fn execute_streaming(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
        sink: &(dyn ChunkSink),
    ) -> ProviderResult<StreamCompletion> {
        let mut request: ChatCompletionRequest = serde_json::from_value(request_body)
            .map_err(|err| ProviderError::BadRequest(err.to_string()))?;
        request.model = upstream_model.to_string();
        request.stream = true;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProviderError::DeadlineBeforeFirstByte);
        }

        let response = tokio::time::timeout(
            remaining,
            self.client
                .post(self.chat_completions_url())
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| ProviderError::DeadlineBeforeFirstByte)?
        .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: response.status().as_u16(),
                body_snippet: String::new(),
            });
        }

        let mut prompt_tokens = 0u64;
        let mut completion_tokens = 0u64;

        let bytes_delivered = drive_sse_stream(response, deadline, sink, |event| {
            if event.data == "[DONE]" {
                return Some(ChunkEvent::Final);
            }
            let chunk: ChatCompletionChunk = serde_json::from_str(&event.data).ok()?;
            if let Some(usage) = &chunk.usage {
                prompt_tokens = usage.prompt_tokens;
                completion_tokens = usage.completion_tokens;
            }
            let delta_text = chunk
                .extra
                .get("choices")
                .and_then(|choices| choices.as_array())
                .and_then(|choices| choices.first())
                .and_then(|choice| choice.get("delta"))
                .and_then(|delta| delta.get("content"))
                .and_then(Value::as_str)
                .map(str::to_string);

            delta_text.map(ChunkEvent::DeltaText)
        })
        .await?;

        sink.push(ChunkEvent::Final).await;

        Ok(StreamCompletion {
            prompt_tokens,
            completion_tokens,
            bytes_delivered,
        })
    }

    async fn health(&self) -> Health {
        let start = Instant::now();
        let result = self
            .client
            .get(build_url(&self.base_url, "/v1/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => Health {
                reachable: true,
                recent_latency: Some(start.elapsed()),
                last_error: None,
            },
            Ok(response) => Health {
                reachable: false,
                recent_latency: Some(start.elapsed()),
                last_error: Some(format!("status {}", response.status())),
            },
            Err(err) => Health {
                reachable: false,
                recent_latency: None,
                last_error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_base_and_path() {
        assert_eq!(
            build_url("https://api.openai.com/", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            build_url("https://api.openai.com", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
