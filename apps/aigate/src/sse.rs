use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use aigate_provider_core::ChunkEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const HEARTBEAT_FRAME: &str = ": keep-alive\n\n";

/// Frames one `ChunkEvent` as `event: <kind>\ndata: <payload>\n\n` (§6).
fn frame(event: &ChunkEvent) -> String {
    match event {
        ChunkEvent::DeltaText(text) => {
            format!("event: delta-text\ndata: {}\n\n", serde_json::json!({ "text": text }))
        }
        ChunkEvent::DeltaToolCall(value) => {
            format!("event: delta-tool-call\ndata: {value}\n\n")
        }
        ChunkEvent::Usage { prompt_tokens, completion_tokens } => format!(
            "event: usage\ndata: {}\n\n",
            serde_json::json!({ "prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens })
        ),
        ChunkEvent::Final => "event: final\ndata: {}\n\n".to_string(),
    }
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"event: done\ndata: {}\n\n")
}

fn error_frame(code: &str) -> Bytes {
    Bytes::from(format!("event: error\ndata: {}\n\n", serde_json::json!({ "error": code })))
}

/// Drains a `ChunkEvent` receiver into an SSE response body, inserting an
/// idle-heartbeat comment frame the way
/// `gproxy_router::proxy::wrap_sse_stream_with_heartbeat` does, and
/// appending the terminal `done` frame — preceded by an `error` frame if
/// the stream ended without a `Final` chunk (§6: truncated streams still
/// get exactly one `done`, with `error` emitted first).
pub fn stream_response(mut rx: mpsc::Receiver<ChunkEvent>) -> Response {
    let (tx, out_rx) = mpsc::channel::<Bytes>(32);

    tokio::spawn(async move {
        let mut saw_final = false;
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if matches!(event, ChunkEvent::Final) {
                        saw_final = true;
                    }
                    if tx.send(Bytes::from(frame(&event))).await.is_err() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(HEARTBEAT_FRAME.as_bytes())).await.is_err() {
                        return;
                    }
                }
            }
        }

        if !saw_final && tx.send(error_frame("stream_truncated")).await.is_err() {
            return;
        }
        let _ = tx.send(done_frame()).await;
    });

    let stream = ReceiverStream::new(out_rx).map(Ok::<_, Infallible>);
    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response.headers_mut().insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, axum::Json(serde_json::json!({ "error": code, "message": message.into() }))).into_response()
}
