use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A (provider, upstream-model, weight, priority) tuple drawn from the route
/// table for one declared model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub upstream_model: String,
    /// Non-negative; relative share within a priority tier.
    pub weight: u32,
    /// Smaller sorts earlier.
    pub priority: i32,
}

impl Candidate {
    pub fn new(
        provider: impl Into<String>,
        upstream_model: impl Into<String>,
        weight: u32,
        priority: i32,
    ) -> Self {
        Self {
            provider: provider.into(),
            upstream_model: upstream_model.into(),
            weight,
            priority,
        }
    }
}

/// Classification an adapter attaches to a failed `Attempt`. Drives both the
/// client-facing error taxonomy (§7) and the circuit breaker (§4.3): only
/// `RetryableTransient`/`RetryableThrottled` count as breaker failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RetryableTransient,
    RetryableThrottled,
    TerminalBadRequest,
    TerminalPartial,
    Deadline,
    BreakerOpen,
}

impl ErrorClass {
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            ErrorClass::RetryableTransient | ErrorClass::RetryableThrottled
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::RetryableTransient | ErrorClass::RetryableThrottled
        )
    }
}

/// Outcome of one `Attempt`. Distinct from `ErrorClass`: an outcome always
/// resolves to one of these six buckets, while `ErrorClass` only applies to
/// the failed ones and carries the finer distinction the breaker needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Terminal,
    BreakerOpen,
    Cancelled,
    Deadline,
}

/// One invocation of one adapter for one candidate. The Attempt list for a
/// request is ordered by `started_at` and append-only; the Router owns it.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub candidate: Candidate,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub outcome: Option<AttemptOutcome>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub error_class: Option<ErrorClass>,
}

impl Attempt {
    pub fn started(candidate: Candidate, started_at: Instant) -> Self {
        Self {
            candidate,
            started_at,
            ended_at: None,
            outcome: None,
            bytes_in: 0,
            bytes_out: 0,
            prompt_tokens: None,
            completion_tokens: None,
            error_class: None,
        }
    }

    pub fn finish(
        &mut self,
        ended_at: Instant,
        outcome: AttemptOutcome,
        error_class: Option<ErrorClass>,
    ) {
        self.ended_at = Some(ended_at);
        self.outcome = Some(outcome);
        self.error_class = error_class;
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        self.ended_at.map(|end| end.saturating_duration_since(self.started_at))
    }

    pub fn compact(&self) -> CompactedAttempt {
        CompactedAttempt {
            provider: self.candidate.provider.clone(),
            upstream_model: self.candidate.upstream_model.clone(),
            outcome: self.outcome,
            error_class: self.error_class,
            duration_ms: self.duration().map(|d| d.as_millis() as u64),
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
        }
    }
}

/// Serializable summary of one `Attempt`, with `Instant`s collapsed to a
/// duration in milliseconds. This is what `UsageRecord::attempts` carries
/// (§3's "compacted attempt log") — the live `Attempt` with its process-only
/// `Instant` timestamps never outlives the Router's request-scoped list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactedAttempt {
    pub provider: String,
    pub upstream_model: String,
    pub outcome: Option<AttemptOutcome>,
    pub error_class: Option<ErrorClass>,
    pub duration_ms: Option<u64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}
