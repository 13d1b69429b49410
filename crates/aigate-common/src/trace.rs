use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::envelope::{PrincipalId, RequestId, TraceId};

/// One entry kind in a request's trace (§3's event-kind enumeration).
/// Every terminated request has `Accepted` at ordinal 0 and exactly one of
/// `Completed`/`Rejected` at the maximal ordinal (§8 trace-completeness).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TraceEventKind {
    Accepted {
        api_family: String,
        declared_model: String,
    },
    Routed {
        candidate_count: usize,
    },
    AttemptStarted {
        provider: String,
        upstream_model: String,
        attempt_ordinal: u32,
    },
    AttemptFailed {
        provider: String,
        error_class: String,
        message: String,
    },
    AttemptSucceeded {
        provider: String,
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    BreakerOpened {
        provider: String,
    },
    BreakerClosed {
        provider: String,
    },
    QuotaReserved {
        reservation_id: String,
        window_kind: String,
        amount: u64,
    },
    QuotaRefunded {
        reservation_id: String,
        window_kind: String,
    },
    QuotaOverrun {
        window_kind: String,
        estimate: u64,
        actual: u64,
    },
    StreamChunk {
        bytes: u64,
    },
    SubscriberDropped {
        subscriber: String,
    },
    Completed {
        status: String,
        streamed: bool,
    },
    Rejected {
        reason: String,
    },
}

/// One entry in a request's trace. Append-only; the Trace Store owns the
/// ordinal assignment and ring-buffer eviction (§4.7). `ordinal` is
/// monotonic and gap-free per `request_id`, assigned by `TraceStore::append`
/// — callers construct with a placeholder and never set it themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub request_id: RequestId,
    pub trace_id: TraceId,
    pub principal: PrincipalId,
    pub ordinal: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub producer: &'static str,
    pub kind: TraceEventKind,
}

impl TraceEvent {
    pub fn new(
        request_id: RequestId,
        trace_id: TraceId,
        principal: PrincipalId,
        at: OffsetDateTime,
        producer: &'static str,
        kind: TraceEventKind,
    ) -> Self {
        Self {
            request_id,
            trace_id,
            principal,
            ordinal: 0,
            at,
            producer,
            kind,
        }
    }
}
