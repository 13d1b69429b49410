use std::time::{Duration, Instant};

use aigate_provider_core::{ChunkEvent, ChunkSink, ProviderError, ProviderResult};
use futures_util::StreamExt;
use serde_json::Value;

/// Minimal shared plumbing every family adapter uses to make an upstream
/// call and classify the result per §4.1's table. Grounded on the
/// teacher's `default_decide_unavailable`: 5xx and transport errors are
/// retryable, 4xx (including auth) is terminal, 429 carries `Retry-After`.
pub async fn send_json(
    client: &wreq::Client,
    request: wreq::RequestBuilder,
    deadline: Instant,
) -> ProviderResult<(u16, Value)> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(ProviderError::DeadlineBeforeFirstByte);
    }

    let response = tokio::time::timeout(remaining, request.send())
        .await
        .map_err(|_| ProviderError::DeadlineBeforeFirstByte)?
        .map_err(|err| ProviderError::Transport(err.to_string()))?;

    let status = response.status().as_u16();
    classify_status(status, &response)?;

    let body: Value = response
        .json()
        .await
        .map_err(|err| ProviderError::Transport(err.to_string()))?;

    Ok((status, body))
}

fn classify_status(status: u16, response: &wreq::Response) -> ProviderResult<()> {
    match status {
        200..=299 => Ok(()),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(ProviderError::RateLimited { retry_after })
        }
        401 | 403 => Err(ProviderError::AuthInvalid),
        400..=499 => Err(ProviderError::BadRequest(format!("upstream status {status}"))),
        500..=599 => Err(ProviderError::UpstreamStatus {
            status,
            body_snippet: String::new(),
        }),
        other => Err(ProviderError::UpstreamStatus {
            status: other,
            body_snippet: String::new(),
        }),
    }
}

/// Drives an SSE byte stream to completion, forwarding parsed frames to
/// `on_event` and chunks to `sink`. Returns once the upstream stream ends
/// or the deadline is reached; on deadline it stops reading rather than
/// draining the rest of the body.
pub async fn drive_sse_stream(
    response: wreq::Response,
    deadline: Instant,
    sink: &(dyn ChunkSink),
    mut on_event: impl FnMut(&aigate_protocol::sse::SseEvent) -> Option<ChunkEvent>,
) -> ProviderResult<u64> {
    let mut parser = aigate_protocol::sse::SseParser::new();
    let mut stream = response.bytes_stream();
    let mut bytes_delivered: u64 = 0;
    let mut any_chunk_sent = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(if any_chunk_sent {
                ProviderError::DeadlinePartial
            } else {
                ProviderError::DeadlineBeforeFirstByte
            });
        }

        let next = match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(bytes))) => bytes,
            Ok(Some(Err(err))) => {
                return Err(if any_chunk_sent {
                    ProviderError::StreamTruncated {
                        bytes_delivered,
                    }
                } else {
                    ProviderError::Transport(err.to_string())
                });
            }
            Ok(None) => break,
            Err(_) => {
                return Err(if any_chunk_sent {
                    ProviderError::DeadlinePartial
                } else {
                    ProviderError::DeadlineBeforeFirstByte
                });
            }
        };

        bytes_delivered += next.len() as u64;
        for event in parser.push_bytes(&next) {
            if let Some(chunk) = on_event(&event) {
                sink.push(chunk).await;
                any_chunk_sent = true;
            }
        }
    }

    for event in parser.finish() {
        if let Some(chunk) = on_event(&event) {
            sink.push(chunk).await;
            any_chunk_sent = true;
        }
    }

    Ok(bytes_delivered)
}
