use std::time::Instant;

use aigate_protocol::claude::{MessagesRequest, MessagesResponse, StreamEvent};
use aigate_provider_core::{
    Adapter, ChunkEvent, ChunkSink, ExecuteOutcome, Health, ProviderError, ProviderResult,
    StreamCompletion,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::http::{drive_sse_stream, send_json};
use crate::providers::openai::build_url;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Claude messages family. Auth goes in `x-api-key` plus a
/// fixed `anthropic-version` header rather than a bearer token; streaming
/// frames carry an explicit `event:` name instead of OpenAI's flat chunks,
/// so usage is split across `message_start` and `message_delta`.
pub struct AnthropicAdapter {
    name: String,
    client: wreq::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(name: impl Into<String>, client: wreq::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn messages_url(&self) -> String {
        build_url(&self.base_url, "/v1/messages")
    }
}

#[async_trait]
impl Adapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
    ) -> ProviderResult<ExecuteOutcome> {
        let mut request: MessagesRequest = serde_json::from_value(request_body)
            .map_err(|err| ProviderError::BadRequest(err.to_string()))?;
        request.model = upstream_model.to_string();
        request.stream = false;

        let http_request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);

        let (status, body) = send_json(&self.client, http_request, deadline).await?;
        let response: MessagesResponse =
            serde_json::from_value(body).map_err(|err| ProviderError::Transport(err.to_string()))?;
        let usage = response.usage.clone().unwrap_or(aigate_protocol::claude::MessagesUsage {
            input_tokens: 0,
            output_tokens: 0,
        });

        Ok(ExecuteOutcome {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
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
        let mut request: MessagesRequest = serde_json::from_value(request_body)
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
                .post(self.messages_url())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
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
            match event.event.as_deref() {
                Some("message_start") => {
                    let parsed: StreamEvent = serde_json::from_str(&event.data).ok()?;
                    if let StreamEvent::MessageStart { message } = parsed {
                        if let Some(usage) = message.usage {
                            prompt_tokens = usage.input_tokens;
                            completion_tokens = usage.output_tokens;
                        }
                    }
                    None
                }
                Some("message_delta") => {
                    let parsed: StreamEvent = serde_json::from_str(&event.data).ok()?;
                    if let StreamEvent::MessageDelta { usage, .. } = parsed {
                        if let Some(output) = usage.and_then(|u| u.output_tokens) {
                            completion_tokens = output;
                        }
                    }
                    None
                }
                Some("content_block_delta") => {
                    let parsed: Value = serde_json::from_str(&event.data).ok()?;
                    parsed
                        .get("delta")
                        .and_then(|delta| delta.get("text"))
                        .and_then(Value::as_str)
                        .map(|text| ChunkEvent::DeltaText(text.to_string()))
                }
                Some("message_stop") => Some(ChunkEvent::Final),
                _ => None,
            }
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
            .get(build_url(&self.base_url, "/v1/models"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
