use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::errors::ProviderResult;

/// Result of a completed (non-streaming) `Execute` call. The body is
/// opaque to the Router — only the Adapter's own `TransformResponse`
/// knows its shape — but token counts and status are canonicalized so the
/// Router/Gateway can bill and trace without inspecting payloads.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub body: Value,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub upstream_status: u16,
}

/// One frame of a streamed response, pushed to the sink in arrival order.
/// Mirrors §4.1's `delta-text | delta-tool-call | usage | final` kinds.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    DeltaText(String),
    DeltaToolCall(Value),
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    Final,
}

/// Where an Adapter's `ExecuteStreaming` pushes chunks. Implemented by the
/// Streaming Event Bus in `aigate-core`; adapters never know about
/// subscribers, backpressure or the bus topic, only that `push` may
/// suspend and may report the sink as closed.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn push(&self, event: ChunkEvent) -> bool;
}

/// Summary returned once a stream finishes successfully.
#[derive(Debug, Clone, Default)]
pub struct StreamCompletion {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub bytes_delivered: u64,
}

/// A provider's self-reported health, gathered without a billable call.
#[derive(Debug, Clone)]
pub struct Health {
    pub reachable: bool,
    pub recent_latency: Option<std::time::Duration>,
    pub last_error: Option<String>,
}

/// The uniform upstream contract (§4.1). One implementation per provider
/// family (OpenAI, Anthropic, Gemini) plus a deterministic `Mock` used in
/// tests. Implementations must be safe to call concurrently — the Router
/// never holds the Adapter behind its own lock, only the immutable
/// `Arc<dyn Adapter>` stored in the Registry.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Non-streaming invocation against `upstream_model`. Implementations
    /// must respect `deadline`: if it is reached before any upstream bytes
    /// arrive, return `ProviderError::DeadlineBeforeFirstByte`; once bytes
    /// have arrived, a deadline breach is `DeadlinePartial` instead.
    async fn execute(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
    ) -> ProviderResult<ExecuteOutcome>;

    /// Streaming invocation. Pushes chunks to `sink` in arrival order and
    /// returns once the stream ends. On error, no further chunks may be
    /// pushed. If the deadline is reached, the adapter must abort its
    /// upstream read promptly rather than draining it.
    async fn execute_streaming(
        &self,
        request_body: Value,
        upstream_model: &str,
        deadline: Instant,
        sink: &(dyn ChunkSink),
    ) -> ProviderResult<StreamCompletion>;

    async fn health(&self) -> Health;
}

/// Raw bytes an adapter has read from upstream but not yet parsed —
/// exposed so the Router's transport layer can hand an adapter whatever
/// chunking its HTTP client already produced without an extra copy.
#[derive(Debug, Clone)]
pub struct RawChunk(pub Bytes);
