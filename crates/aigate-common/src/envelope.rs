use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique per-process request identifier. 128 bits, assigned once at the
/// gateway entry and carried unchanged through every Attempt/TraceEvent.
pub type RequestId = Uuid;

/// Inherited across a chain of related requests (e.g. retries issued by the
/// client itself); defaults to the request id when the request starts a new
/// chain.
pub type TraceId = Uuid;

pub type PrincipalId = String;
pub type ControlRoomId = String;

/// A `category:value` pair attached to requests, keys and providers for
/// filtering and routing. Stored pre-split so callers don't re-parse it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub category: String,
    pub value: String,
}

impl Tag {
    pub fn new(category: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            value: value.into(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (category, value) = raw.split_once(':')?;
        if category.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(category, value))
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.value)
    }
}

/// The API family a request declares. The core only needs to identify this
/// much of the wire shape; everything else is opaque to it and forwarded to
/// the adapter's `TransformRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    Chat,
    Messages,
    Responses,
    Embeddings,
    Images,
    Transcriptions,
    Gemini,
}

impl ApiFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::Chat => "chat",
            ApiFamily::Messages => "messages",
            ApiFamily::Responses => "responses",
            ApiFamily::Embeddings => "embeddings",
            ApiFamily::Images => "images",
            ApiFamily::Transcriptions => "transcriptions",
            ApiFamily::Gemini => "gemini",
        }
    }
}

/// Immutable per-request descriptor. Constructed once by the Gateway entry
/// point and never mutated afterwards; the Router, Quota Enforcer and
/// adapters all read from it but none of them own it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub request_id: RequestId,
    pub trace_id: TraceId,
    pub api_family: ApiFamily,
    pub declared_model: String,
    pub principal: PrincipalId,
    pub control_room: Option<ControlRoomId>,
    pub tags: BTreeSet<Tag>,
    pub received_at: Instant,
    /// Absolute point in (monotonic) time by which the response must have
    /// started, derived as `min(client deadline, server-side ceiling)`.
    pub deadline: Instant,
}

impl RequestEnvelope {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trace_id: TraceId,
        api_family: ApiFamily,
        declared_model: impl Into<String>,
        principal: PrincipalId,
        control_room: Option<ControlRoomId>,
        tags: BTreeSet<Tag>,
        received_at: Instant,
        deadline: Instant,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            trace_id,
            api_family,
            declared_model: declared_model.into(),
            principal,
            control_room,
            tags,
            received_at,
            deadline,
        }
    }

    /// Time remaining until `deadline`, or `Duration::ZERO` if already past.
    pub fn remaining_deadline(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn deadline_reached(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parses_category_value() {
        assert_eq!(
            Tag::parse("team:payments"),
            Some(Tag::new("team", "payments"))
        );
        assert_eq!(Tag::parse("noop"), None);
        assert_eq!(Tag::parse(":value"), None);
        assert_eq!(Tag::parse("category:"), None);
    }

    #[test]
    fn remaining_deadline_saturates_at_zero() {
        let now = Instant::now();
        let envelope = RequestEnvelope::new(
            Uuid::new_v4(),
            ApiFamily::Chat,
            "gpt-4o-mini",
            "p1".to_string(),
            None,
            BTreeSet::new(),
            now,
            now - Duration::from_millis(5),
        );
        assert_eq!(envelope.remaining_deadline(now), Duration::ZERO);
        assert!(envelope.deadline_reached(now));
    }
}
