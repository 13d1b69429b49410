use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::attempt::CompactedAttempt;
use crate::envelope::{ControlRoomId, PrincipalId, RequestId, TraceId};

/// Terminal billing state for a request. `Partial` covers the
/// stream-truncated-mid-response case (§3, §8): tokens already delivered
/// are billed, nothing further is reserved. `Rejected` covers requests that
/// never reached an Attempt (unknown route, quota exceeded, deadline before
/// dispatch) — still exactly one UsageRecord, with zero tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Completed,
    Partial,
    Failed,
    Rejected,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Completed => "completed",
            UsageStatus::Partial => "partial",
            UsageStatus::Failed => "failed",
            UsageStatus::Rejected => "rejected",
        }
    }
}

/// One billing record, emitted exactly once per terminated request
/// regardless of how many Attempts it took (the "at-most-one-billable"
/// property in §8). Carries a compacted copy of the Attempt list rather
/// than a foreign key, since Attempts are Router-owned and released with
/// the envelope while UsageRecords outlive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: RequestId,
    pub trace_id: TraceId,
    pub principal: PrincipalId,
    pub control_room: Option<ControlRoomId>,
    pub api_family: String,
    pub declared_model: String,
    pub provider: Option<String>,
    pub upstream_model: Option<String>,
    pub status: UsageStatus,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: Option<f64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempt_count: u32,
    pub attempts: Vec<CompactedAttempt>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn duration(&self) -> time::Duration {
        self.completed_at - self.started_at
    }
}
