use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

/// What the handlers need from the external auth collaborator (§1, §9):
/// a resolved principal id. Real key verification, workspace/control-room
/// resolution and rate-limit tiering live outside this core; this extracts
/// only what `RequestEnvelope` needs to carry.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
}

pub async fn extract_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let key = extract_key(req.headers(), req.uri().query()).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(AuthContext { principal: key });
    Ok(next.run(req).await)
}

fn extract_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            let s = s.trim();
            let prefix = "Bearer ";
            if s.len() > prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
                let token = s[prefix.len()..].trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    if let Some(value) = headers.get("x-api-key") {
        if let Ok(s) = value.to_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    if let Some(value) = headers.get("x-goog-api-key") {
        if let Ok(s) = value.to_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    let query = query?;
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    pairs
        .into_iter()
        .find(|(k, _)| k == "key")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
