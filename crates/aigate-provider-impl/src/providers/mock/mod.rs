use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use aigate_provider_core::{
    Adapter, ChunkEvent, ChunkSink, ExecuteOutcome, Health, ProviderError, ProviderResult,
    StreamCompletion,
};
use async_trait::async_trait;
use serde_json::Value;

/// A scripted response the mock adapter plays back on its next call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok { prompt_tokens: u64, completion_tokens: u64 },
    StreamOk { chunks: Vec<String>, prompt_tokens: u64, completion_tokens: u64 },
    /// Delivers `chunks` to the sink and then fails, modeling an upstream
    /// that dies mid-response rather than before or after. Used to exercise
    /// the "failure after first chunk is final" invariant (§4.2, §8) since
    /// `Fail` alone only covers the before-first-byte case.
    StreamPartial { chunks: Vec<String>, failure: MockFailure },
    Fail(MockFailure),
}

#[derive(Debug, Clone)]
pub enum MockFailure {
    Transient,
    Throttled,
    BadRequest,
    DeadlineBeforeFirstByte,
    DeadlinePartial,
}

impl MockFailure {
    fn into_provider_error(self) -> ProviderError {
        match self {
            MockFailure::Transient => ProviderError::UpstreamStatus {
                status: 503,
                body_snippet: "mock transient failure".to_string(),
            },
            MockFailure::Throttled => ProviderError::RateLimited { retry_after: None },
            MockFailure::BadRequest => ProviderError::BadRequest("mock bad request".to_string()),
            MockFailure::DeadlineBeforeFirstByte => ProviderError::DeadlineBeforeFirstByte,
            MockFailure::DeadlinePartial => ProviderError::DeadlinePartial,
        }
    }
}

/// Deterministic adapter used in router/gateway tests in place of a real
/// upstream: calls are scripted in advance and replayed in order, rather
/// than hitting any network. Mirrors the teacher's own test-double
/// adapters used to exercise failover without live credentials.
pub struct MockAdapter {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>, script: Vec<Scripted>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    fn next_step(&self) -> Scripted {
        self.script
            .lock()
            .expect("mock adapter script lock poisoned")
            .pop_front()
            .unwrap_or(Scripted::Fail(MockFailure::BadRequest))
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request_body: Value,
        _upstream_model: &str,
        _deadline: Instant,
    ) -> ProviderResult<ExecuteOutcome> {
        match self.next_step() {
            Scripted::Ok { prompt_tokens, completion_tokens } => Ok(ExecuteOutcome {
                body: request_body,
                prompt_tokens,
                completion_tokens,
                upstream_status: 200,
            }),
            Scripted::StreamOk { prompt_tokens, completion_tokens, .. } => Ok(ExecuteOutcome {
                body: request_body,
                prompt_tokens,
                completion_tokens,
                upstream_status: 200,
            }),
            Scripted::StreamPartial { failure, .. } => Err(failure.into_provider_error()),
            Scripted::Fail(failure) => Err(failure.into_provider_error()),
        }
    }

    async fn execute_streaming(
        &self,
        _request_body: Value,
        _upstream_model: &str,
        _deadline: Instant,
        sink: &(dyn ChunkSink),
    ) -> ProviderResult<StreamCompletion> {
        match self.next_step() {
            Scripted::StreamOk { chunks, prompt_tokens, completion_tokens } => {
                let mut bytes_delivered = 0u64;
                for chunk in chunks {
                    bytes_delivered += chunk.len() as u64;
                    sink.push(ChunkEvent::DeltaText(chunk)).await;
                }
                sink.push(ChunkEvent::Usage { prompt_tokens, completion_tokens }).await;
                sink.push(ChunkEvent::Final).await;
                Ok(StreamCompletion {
                    prompt_tokens,
                    completion_tokens,
                    bytes_delivered,
                })
            }
            Scripted::Ok { prompt_tokens, completion_tokens } => {
                sink.push(ChunkEvent::Usage { prompt_tokens, completion_tokens }).await;
                sink.push(ChunkEvent::Final).await;
                Ok(StreamCompletion {
                    prompt_tokens,
                    completion_tokens,
                    bytes_delivered: 0,
                })
            }
            Scripted::StreamPartial { chunks, failure } => {
                for chunk in chunks {
                    sink.push(ChunkEvent::DeltaText(chunk)).await;
                }
                Err(failure.into_provider_error())
            }
            Scripted::Fail(failure) => Err(failure.into_provider_error()),
        }
    }

    async fn health(&self) -> Health {
        Health {
            reachable: true,
            recent_latency: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NullSink;

    #[async_trait]
    impl ChunkSink for NullSink {
        async fn push(&self, _event: ChunkEvent) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn replays_scripted_steps_in_order() {
        let adapter = MockAdapter::new(
            "mock",
            vec![
                Scripted::Fail(MockFailure::Transient),
                Scripted::Ok { prompt_tokens: 10, completion_tokens: 5 },
            ],
        );
        let deadline = Instant::now() + Duration::from_secs(1);

        let first = adapter.execute(Value::Null, "m", deadline).await;
        assert!(first.is_err());

        let second = adapter.execute(Value::Null, "m", deadline).await.unwrap();
        assert_eq!(second.prompt_tokens, 10);
        assert_eq!(second.completion_tokens, 5);
    }

    #[tokio::test]
    async fn exhausted_script_falls_back_to_bad_request() {
        let adapter = MockAdapter::new("mock", vec![]);
        let deadline = Instant::now() + Duration::from_secs(1);
        let result = adapter.execute(Value::Null, "m", deadline).await;
        assert!(matches!(result, Err(ProviderError::BadRequest(_))));
    }

    #[tokio::test]
    async fn streaming_delivers_chunks_then_usage_and_final() {
        let adapter = MockAdapter::new(
            "mock",
            vec![Scripted::StreamOk {
                chunks: vec!["hel".to_string(), "lo".to_string()],
                prompt_tokens: 3,
                completion_tokens: 2,
            }],
        );
        let deadline = Instant::now() + Duration::from_secs(1);
        let sink = NullSink;
        let completion = adapter
            .execute_streaming(Value::Null, "m", deadline, &sink)
            .await
            .unwrap();
        assert_eq!(completion.bytes_delivered, 5);
        assert_eq!(completion.completion_tokens, 2);
    }
}
