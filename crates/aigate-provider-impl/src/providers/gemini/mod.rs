use std::time::Instant;

use aigate_protocol::gemini::{GenerateContentRequest, GenerateContentResponse};
use aigate_provider_core::{
    Adapter, ChunkEvent, ChunkSink, ExecuteOutcome, Health, ProviderError, ProviderResult,
    StreamCompletion,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::http::{drive_sse_stream, send_json};
use crate::providers::openai::build_url;

/// Adapter for Gemini's `generateContent` family. Unlike OpenAI/Claude,
/// model selects the URL path rather than a body field, auth is a `key`
/// query parameter rather than a header, and streaming is requested via
/// `alt=sse` on the `streamGenerateContent` path; usage is repeated
/// cumulatively on every chunk rather than split or delivered once.
pub struct GeminiAdapter {
    name: String,
    client: wreq::Client,
    base_url: String,
    api_key: String,
}

impl GeminiAdapter {
    pub fn new(name: impl Into<String>, client: wreq::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn generate_url(&self, upstream_model: &str) -> String {
        build_url(&self.base_url, &format!("/v1beta/models/{upstream_model}:generateContent"))
    }

    fn stream_url(&self, upstream_model: &str) -> String {
        build_url(
            &self.base_url,
            &format!("/v1beta/models/{upstream_model}:streamGenerateContent?alt=sse"),
        )
    }
}

#[async_trait]
impl Adapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
    ) -> ProviderResult<ExecuteOutcome> {
        let request: GenerateContentRequest = serde_json::from_value(request_body)
            .map_err(|err| ProviderError::BadRequest(err.to_string()))?;

        let http_request = self
            .client
            .post(self.generate_url(upstream_model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request);

        let (status, body) = send_json(&self.client, http_request, deadline).await?;
        let response: GenerateContentResponse =
            serde_json::from_value(body).map_err(|err| ProviderError::Transport(err.to_string()))?;
        let usage = response.usage_metadata.clone().unwrap_or(aigate_protocol::gemini::UsageMetadata {
            prompt_token_count: 0,
            candidates_token_count: 0,
        });

        Ok(ExecuteOutcome {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            upstream_status: status,
            body: serde_json::to_value(&response).unwrap_or(Value::Null),
        })
    }

    async fn execute_streaming(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
        sink: &(dyn ChunkSink),
    ) -> ProviderResult<StreamCompletion> {
        let request: GenerateContentRequest = serde_json::from_value(request_body)
            .map_err(|err| ProviderError::BadRequest(err.to_string()))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProviderError::DeadlineBeforeFirstByte);
        }

        let response = tokio::time::timeout(
            remaining,
            self.client
                .post(self.stream_url(upstream_model))
                .query(&[("key", self.api_key.as_str())])
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
            let chunk: GenerateContentResponse = serde_json::from_str(&event.data).ok()?;
            if let Some(usage) = &chunk.usage_metadata {
                prompt_tokens = usage.prompt_token_count;
                completion_tokens = usage.candidates_token_count;
            }
            let delta_text = chunk
                .extra
                .get("candidates")
                .and_then(|candidates| candidates.as_array())
                .and_then(|candidates| candidates.first())
                .and_then(|candidate| candidate.get("content"))
                .and_then(|content| content.get("parts"))
                .and_then(|parts| parts.as_array())
                .and_then(|parts| parts.first())
                .and_then(|part| part.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string);

            delta_text.map(ChunkEvent::DeltaText)
        })
        .await?;

        sink.push(ChunkEvent::Usage {
            prompt_tokens,
            completion_tokens,
        })
        .await;
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
            .get(build_url(&self.base_url, "/v1beta/models"))
            .query(&[("key", self.api_key.as_str())])
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
