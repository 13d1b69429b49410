use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router as AxumRouter;
use serde::Deserialize;
use time::OffsetDateTime;

use aigate_core::AppState;
use aigate_provider_core::AdapterRegistry;

#[derive(Clone)]
pub struct AdminState {
    pub app: Arc<AppState>,
    pub registry: Arc<AdapterRegistry>,
}

pub fn router(app: Arc<AppState>, registry: Arc<AdapterRegistry>) -> AxumRouter {
    let state = AdminState { app, registry };

    AxumRouter::new()
        .route("/health", get(health))
        .route("/usage", get(list_usage))
        .route("/usage/aggregate", get(usage_aggregate))
        .route("/trace/recent", get(recent_traces))
        .route("/trace/{request_id}", get(trace_for_request))
        .route("/breakers", get(breaker_snapshots))
        .route("/quota/{principal}", get(quota_status))
        .route("/providers", get(provider_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}

async fn admin_auth(
    State(state): State<AdminState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = extract_admin_key(&headers, req.uri()).ok_or(StatusCode::UNAUTHORIZED)?;
    let Some(expected_hash) = (state.app.secrets)("admin_key_hash") else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    if blake3::hash(key.as_bytes()).to_hex().to_string() != expected_hash {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

fn extract_admin_key(headers: &HeaderMap, uri: &axum::http::Uri) -> Option<String> {
    if let Some(value) = headers.get("x-admin-key") {
        if let Ok(s) = value.to_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth) = value.to_str() {
            let auth = auth.trim();
            let prefix = "Bearer ";
            if auth.len() > prefix.len() && auth[..prefix.len()].eq_ignore_ascii_case(prefix) {
                let token = auth[prefix.len()..].trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let query = uri.query()?;
    let parsed: std::collections::HashMap<String, String> = serde_urlencoded::from_str(query).ok()?;
    let key = parsed.get("admin_key")?.trim();
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    limit: Option<usize>,
}

async fn list_usage(State(state): State<AdminState>, Query(query): Query<UsageQuery>) -> impl IntoResponse {
    let records = state.app.usage.list(query.limit.unwrap_or(100));
    Json(serde_json::json!({ "records": records }))
}

#[derive(Debug, Deserialize)]
struct UsageAggregateQuery {
    #[serde(default)]
    since_unix: Option<i64>,
}

async fn usage_aggregate(
    State(state): State<AdminState>,
    Query(query): Query<UsageAggregateQuery>,
) -> impl IntoResponse {
    let since = query
        .since_unix
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let aggregate = state.app.usage.aggregate_by_principal(since).await;
    Json(serde_json::json!({ "by_principal": aggregate }))
}

#[derive(Debug, Deserialize)]
struct RecentTraceQuery {
    limit: Option<usize>,
}

async fn recent_traces(State(state): State<AdminState>, Query(query): Query<RecentTraceQuery>) -> impl IntoResponse {
    let ids: Vec<String> = state.app.trace.recent(query.limit.unwrap_or(50)).iter().map(|id| id.to_string()).collect();
    Json(serde_json::json!({ "request_ids": ids }))
}

async fn trace_for_request(State(state): State<AdminState>, Path(request_id): Path<String>) -> impl IntoResponse {
    let Ok(request_id) = request_id.parse::<uuid::Uuid>() else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invalid_request_id" }))).into_response();
    };
    let events = state.app.trace.query(request_id);
    (StatusCode::OK, Json(serde_json::json!({ "events": events }))).into_response()
}

async fn breaker_snapshots(State(state): State<AdminState>) -> impl IntoResponse {
    let gateway = state.app.gateway();
    let snapshots: Vec<_> = gateway
        .router()
        .breaker_snapshots()
        .into_iter()
        .map(|(provider, state)| serde_json::json!({ "provider": provider, "state": state }))
        .collect();
    Json(serde_json::json!({ "breakers": snapshots }))
}

async fn quota_status(State(state): State<AdminState>, Path(principal): Path<String>) -> impl IntoResponse {
    let windows: Vec<_> = state
        .app
        .quota
        .status(&principal)
        .into_iter()
        .map(|(kind, window)| serde_json::json!({ "kind": kind, "window": window }))
        .collect();
    Json(serde_json::json!({ "principal": principal, "windows": windows }))
}

/// `Adapter::health()` without a billable call (§4's health-check
/// supplement), so operators can see provider reachability without this
/// crate knowing anything about adapter internals.
async fn provider_health(State(state): State<AdminState>) -> impl IntoResponse {
    let mut providers = Vec::new();
    for name in state.registry.provider_names() {
        let Ok(adapter) = state.registry.get(name) else { continue };
        let health = adapter.health().await;
        providers.push(serde_json::json!({
            "provider": name,
            "reachable": health.reachable,
            "recent_latency_ms": health.recent_latency.map(|d| d.as_millis() as u64),
            "last_error": health.last_error,
        }));
    }
    Json(serde_json::json!({ "providers": providers }))
}
