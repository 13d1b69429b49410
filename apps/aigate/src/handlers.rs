use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use aigate_common::{ApiFamily, RequestEnvelope};
use aigate_core::{AppState, GatewayError};
use aigate_transform::Proto;

use crate::auth::AuthContext;
use crate::sse;

/// Upper bound on how long a request may run end to end absent a
/// client-specified deadline, applied as `received_at + this` (§6's
/// "min(client deadline, server-side ceiling)" — this binary never reads
/// a client-supplied deadline header, so the ceiling is the only input).
const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(60);

fn build_envelope(api_family: ApiFamily, declared_model: String, principal: String) -> RequestEnvelope {
    let now = Instant::now();
    RequestEnvelope::new(
        Uuid::new_v4(),
        api_family,
        declared_model,
        principal,
        None,
        BTreeSet::new(),
        now,
        now + DEFAULT_REQUEST_DEADLINE,
    )
}

fn gateway_error_response(err: GatewayError) -> Response {
    let (status, code) = match &err {
        GatewayError::UnknownRoute => (StatusCode::NOT_FOUND, "gateway/unknown-route"),
        GatewayError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "quota/exceeded"),
        GatewayError::Deadline => (StatusCode::GATEWAY_TIMEOUT, "gateway/deadline"),
        GatewayError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "upstream/unavailable"),
        GatewayError::BadRequest(_) => (StatusCode::BAD_REQUEST, "upstream/bad-request"),
        GatewayError::Transform(_) => (StatusCode::BAD_REQUEST, "upstream/bad-request"),
    };
    sse::error_response(status, code, err.to_string())
}

fn declared_model(body: &Value) -> Option<String> {
    body.get("model").and_then(Value::as_str).map(str::to_string)
}

fn wants_stream(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

/// Shared non-streaming/streaming dispatch for every declared API family
/// (§6). `model`/`stream` are passed explicitly rather than read back out
/// of `body` so Gemini's path-encoded model/action — which never appear
/// in its wire body — don't have to be spliced into it first.
async fn dispatch(
    state: Arc<AppState>,
    principal: String,
    api_family: ApiFamily,
    proto: Proto,
    model: String,
    stream: bool,
    body: Value,
) -> Response {
    let envelope = build_envelope(api_family, model, principal);
    let gateway = state.gateway();

    if stream {
        let deadline = envelope.remaining_deadline(Instant::now());
        match gateway.execute_streaming(envelope, proto, body, deadline).await {
            Ok(rx) => sse::stream_response(rx),
            Err(err) => gateway_error_response(err),
        }
    } else {
        match gateway.execute(envelope, proto, body).await {
            Ok(outcome) => Json(outcome.body).into_response(),
            Err(err) => gateway_error_response(err),
        }
    }
}

pub async fn openai_chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Chat, Proto::OpenAi, body).await
}

pub async fn openai_responses(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Responses, Proto::OpenAi, body).await
}

pub async fn openai_embeddings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Embeddings, Proto::OpenAi, body).await
}

pub async fn openai_images_generations(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Images, Proto::OpenAi, body).await
}

pub async fn openai_audio_transcriptions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Transcriptions, Proto::OpenAi, body).await
}

pub async fn claude_messages(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Response {
    chat_shaped_dispatch(state, auth, ApiFamily::Messages, Proto::Claude, body).await
}

/// Every non-Gemini family carries its model name and stream flag in the
/// JSON body itself; this just pulls them out before handing off to the
/// shared dispatcher.
async fn chat_shaped_dispatch(
    state: Arc<AppState>,
    auth: AuthContext,
    api_family: ApiFamily,
    proto: Proto,
    body: Value,
) -> Response {
    let Some(model) = declared_model(&body) else {
        return sse::error_response(StatusCode::BAD_REQUEST, "upstream/bad-request", "missing model field");
    };
    let stream = wants_stream(&body);
    dispatch(state, auth.principal, api_family, proto, model, stream, body).await
}

/// Gemini's `models/{model}:{action}` path encodes both the model and the
/// operation (`generateContent` | `streamGenerateContent` | `countTokens`)
/// that every other family carries in the body (§6, grounded on the
/// teacher's `split_provider_model_action`). `countTokens` is rejected
/// here rather than silently billed, since this gateway has no
/// token-counting-only adapter path. The wire body is forwarded unchanged
/// — Gemini's own API never expects `model`/`stream` inside it.
pub async fn gemini_generate_content(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(model_action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return sse::error_response(StatusCode::BAD_REQUEST, "upstream/bad-request", "missing :action suffix");
    };
    let stream = match action {
        "generateContent" => false,
        "streamGenerateContent" => true,
        _ => {
            return sse::error_response(StatusCode::NOT_FOUND, "gateway/unknown-route", format!("unsupported action {action}"))
        }
    };

    dispatch(state, auth.principal, ApiFamily::Gemini, Proto::Gemini, model.to_string(), stream, body).await
}
