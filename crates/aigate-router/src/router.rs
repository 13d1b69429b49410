use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use aigate_common::attempt::{Attempt, AttemptOutcome, Candidate, ErrorClass};
use aigate_common::breaker::{BreakerParams, CircuitState, CircuitStatus};
use aigate_provider_core::{AdapterRegistry, ChunkSink, ExecuteOutcome, StreamCompletion};
use serde_json::Value;

use crate::route_table::RouteTable;
use crate::select::order_candidates;

/// Caps how many adapters the Router will try for one request and how much
/// of the envelope deadline a single attempt may consume (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub retry_budget: u32,
    pub per_attempt_ceiling: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry_budget: 2,
            per_attempt_ceiling: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterFailureReason {
    NoRoute,
    Deadline,
    Exhausted(ErrorClass),
    Terminal(ErrorClass),
}

#[derive(Debug)]
pub struct RouterFailure {
    pub reason: RouterFailureReason,
    pub attempts: Vec<Attempt>,
}

impl std::fmt::Display for RouterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            RouterFailureReason::NoRoute => write!(f, "router/no-route: declared model has no candidates"),
            RouterFailureReason::Deadline => write!(f, "router/deadline: insufficient time remaining to attempt a candidate"),
            RouterFailureReason::Exhausted(class) => write!(f, "router/exhausted: retry budget used up, last failure {class:?}"),
            RouterFailureReason::Terminal(class) => write!(f, "router/terminal: {class:?}"),
        }
    }
}

impl std::error::Error for RouterFailure {}

pub struct ExecuteSuccess {
    pub provider: String,
    pub upstream_model: String,
    pub outcome: ExecuteOutcome,
    pub attempts: Vec<Attempt>,
}

pub struct StreamingSuccess {
    pub provider: String,
    pub upstream_model: String,
    pub completion: StreamCompletion,
    pub attempts: Vec<Attempt>,
}

/// Per-request orchestrator (§4.2): orders candidates, consults each
/// candidate's Circuit Breaker, invokes the Adapter, classifies the
/// outcome, and decides whether to retry. Never invokes two adapters
/// concurrently for the same request.
pub struct Router {
    registry: std::sync::Arc<AdapterRegistry>,
    routes: RouteTable,
    breakers: HashMap<String, Mutex<CircuitStatus>>,
    config: RouterConfig,
    transitions: Mutex<Vec<BreakerTransition>>,
}

/// A breaker state change observed since the last `take_transitions` drain.
/// The Gateway drains these after each Router call to emit the
/// `breaker-opened`/`breaker-closed` TraceEvents named in §3; the Router
/// itself never touches the Trace Store (§9: explicit collaborators, no
/// ambient singletons reaching into an unrelated crate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerTransition {
    pub provider: String,
    pub opened: bool,
}

impl Router {
    pub fn new(
        registry: std::sync::Arc<AdapterRegistry>,
        routes: RouteTable,
        breaker_params: impl Fn(&str) -> BreakerParams,
        config: RouterConfig,
    ) -> Self {
        let breakers = registry
            .provider_names()
            .into_iter()
            .map(|name| (name.to_string(), Mutex::new(CircuitStatus::new(breaker_params(name)))))
            .collect();
        Self {
            registry,
            routes,
            breakers,
            config,
            transitions: Mutex::new(Vec::new()),
        }
    }

    fn breaker_is_open(&self, provider: &str) -> bool {
        let Some(lock) = self.breakers.get(provider) else {
            return false;
        };
        let mut status = lock.lock().expect("breaker lock poisoned");
        status.effective_state(Instant::now()) == CircuitState::Open
    }

    fn breaker_admit(&self, provider: &str, now: Instant) -> bool {
        match self.breakers.get(provider) {
            Some(lock) => lock.lock().expect("breaker lock poisoned").admit(now),
            None => true,
        }
    }

    fn breaker_record_success(&self, provider: &str, now: Instant) {
        let Some(lock) = self.breakers.get(provider) else { return };
        let mut status = lock.lock().expect("breaker lock poisoned");
        let before = status.effective_state(now);
        status.record_success(now);
        if before == CircuitState::HalfOpen && status.state() == CircuitState::Closed {
            self.transitions.lock().unwrap().push(BreakerTransition { provider: provider.to_string(), opened: false });
        }
    }

    fn breaker_record_failure(&self, provider: &str, now: Instant) {
        let Some(lock) = self.breakers.get(provider) else { return };
        let mut status = lock.lock().expect("breaker lock poisoned");
        let before = status.effective_state(now);
        status.record_failure(now);
        if before != CircuitState::Open && status.state() == CircuitState::Open {
            self.transitions.lock().unwrap().push(BreakerTransition { provider: provider.to_string(), opened: true });
        }
    }

    pub fn breaker_state(&self, provider: &str) -> Option<CircuitState> {
        self.breakers
            .get(provider)
            .map(|lock| lock.lock().expect("breaker lock poisoned").effective_state(Instant::now()))
    }

    /// Snapshot of every registered provider's current breaker state, for
    /// the admin surface (§6 persisted state: `circuit_breaker_states`).
    pub fn breaker_snapshots(&self) -> Vec<(String, CircuitState)> {
        let now = Instant::now();
        self.breakers
            .iter()
            .map(|(name, lock)| (name.clone(), lock.lock().expect("breaker lock poisoned").effective_state(now)))
            .collect()
    }

    /// Drains breaker state transitions observed since the last call.
    pub fn take_transitions(&self) -> Vec<BreakerTransition> {
        std::mem::take(&mut self.transitions.lock().unwrap())
    }

    fn ordered_candidates(&self, declared_model: &str, request_id: &str) -> Result<Vec<Candidate>, RouterFailure> {
        let candidates = self
            .routes
            .candidates_for(declared_model)
            .filter(|c| !c.is_empty())
            .ok_or(RouterFailure {
                reason: RouterFailureReason::NoRoute,
                attempts: Vec::new(),
            })?;
        Ok(order_candidates(candidates, request_id, |provider| self.breaker_is_open(provider)))
    }

    /// Non-streaming execution loop (§4.2 point-by-point).
    pub async fn execute(
        &self,
        request_id: &str,
        declared_model: &str,
        request_body: Value,
        deadline: Instant,
    ) -> Result<ExecuteSuccess, RouterFailure> {
        let ordered = self.ordered_candidates(declared_model, request_id)?;
        let mut attempts = Vec::new();
        let mut candidates = ordered.into_iter();
        let mut attempted = 0u32;
        let mut last_class = None;

        while attempted < self.config.retry_budget {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining < self.config.per_attempt_ceiling {
                return Err(RouterFailure { reason: RouterFailureReason::Deadline, attempts });
            }

            let Some(candidate) = candidates.next() else {
                break;
            };
            attempted += 1;

            if !self.breaker_admit(&candidate.provider, now) {
                let mut attempt = Attempt::started(candidate.clone(), now);
                attempt.finish(now, AttemptOutcome::BreakerOpen, Some(ErrorClass::BreakerOpen));
                attempts.push(attempt);
                continue;
            }

            let Ok(adapter) = self.registry.get(&candidate.provider) else {
                let mut attempt = Attempt::started(candidate.clone(), now);
                attempt.finish(now, AttemptOutcome::Terminal, Some(ErrorClass::TerminalBadRequest));
                attempts.push(attempt);
                last_class = Some(ErrorClass::TerminalBadRequest);
                continue;
            };

            let per_attempt_deadline = std::cmp::min(deadline, now + self.config.per_attempt_ceiling);
            let mut attempt = Attempt::started(candidate.clone(), now);

            match adapter.execute(request_body.clone(), &candidate.upstream_model, per_attempt_deadline).await {
                Ok(outcome) => {
                    let ended = Instant::now();
                    attempt.prompt_tokens = Some(outcome.prompt_tokens);
                    attempt.completion_tokens = Some(outcome.completion_tokens);
                    attempt.finish(ended, AttemptOutcome::Success, None);
                    attempts.push(attempt);
                    self.breaker_record_success(&candidate.provider, ended);
                    return Ok(ExecuteSuccess {
                        provider: candidate.provider,
                        upstream_model: candidate.upstream_model,
                        outcome,
                        attempts,
                    });
                }
                Err(err) => {
                    let ended = Instant::now();
                    let class = err.error_class();
                    let outcome = outcome_for_class(class);
                    attempt.finish(ended, outcome, Some(class));
                    attempts.push(attempt);
                    if class.trips_breaker() {
                        self.breaker_record_failure(&candidate.provider, ended);
                    }
                    last_class = Some(class);
                    if !continues_to_next_candidate(class) {
                        return Err(RouterFailure { reason: RouterFailureReason::Terminal(class), attempts });
                    }
                }
            }
        }

        Err(RouterFailure {
            reason: RouterFailureReason::Exhausted(last_class.unwrap_or(ErrorClass::RetryableTransient)),
            attempts,
        })
    }

    /// Streaming execution: head-of-line attempts with failover only
    /// before the first chunk reaches the sink (§4.2, §8 failover-before-
    /// first-byte). The adapter's own error taxonomy already distinguishes
    /// "failed before any bytes" (`DeadlineBeforeFirstByte`, pre-stream
    /// transport/status errors) from "failed after bytes were delivered"
    /// (`DeadlinePartial`, `StreamTruncated`), so the Router need only
    /// check `ErrorClass` to honor the invariant — it never inspects the
    /// sink itself.
    pub async fn execute_streaming(
        &self,
        request_id: &str,
        declared_model: &str,
        request_body: Value,
        deadline: Instant,
        sink: &(dyn ChunkSink),
    ) -> Result<StreamingSuccess, RouterFailure> {
        let ordered = self.ordered_candidates(declared_model, request_id)?;
        let mut attempts = Vec::new();
        let mut candidates = ordered.into_iter();
        let mut attempted = 0u32;
        let mut last_class = None;

        while attempted < self.config.retry_budget {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining < self.config.per_attempt_ceiling {
                return Err(RouterFailure { reason: RouterFailureReason::Deadline, attempts });
            }

            let Some(candidate) = candidates.next() else {
                break;
            };
            attempted += 1;

            if !self.breaker_admit(&candidate.provider, now) {
                let mut attempt = Attempt::started(candidate.clone(), now);
                attempt.finish(now, AttemptOutcome::BreakerOpen, Some(ErrorClass::BreakerOpen));
                attempts.push(attempt);
                continue;
            }

            let Ok(adapter) = self.registry.get(&candidate.provider) else {
                let mut attempt = Attempt::started(candidate.clone(), now);
                attempt.finish(now, AttemptOutcome::Terminal, Some(ErrorClass::TerminalBadRequest));
                attempts.push(attempt);
                last_class = Some(ErrorClass::TerminalBadRequest);
                continue;
            };

            let per_attempt_deadline = std::cmp::min(deadline, now + self.config.per_attempt_ceiling);
            let mut attempt = Attempt::started(candidate.clone(), now);

            match adapter
                .execute_streaming(request_body.clone(), &candidate.upstream_model, per_attempt_deadline, sink)
                .await
            {
                Ok(completion) => {
                    let ended = Instant::now();
                    attempt.bytes_out = completion.bytes_delivered;
                    attempt.prompt_tokens = Some(completion.prompt_tokens);
                    attempt.completion_tokens = Some(completion.completion_tokens);
                    attempt.finish(ended, AttemptOutcome::Success, None);
                    attempts.push(attempt);
                    self.breaker_record_success(&candidate.provider, ended);
                    return Ok(StreamingSuccess {
                        provider: candidate.provider,
                        upstream_model: candidate.upstream_model,
                        completion,
                        attempts,
                    });
                }
                Err(err) => {
                    let ended = Instant::now();
                    let class = err.error_class();
                    let outcome = outcome_for_class(class);
                    attempt.finish(ended, outcome, Some(class));
                    attempts.push(attempt);
                    if class.trips_breaker() {
                        self.breaker_record_failure(&candidate.provider, ended);
                    }
                    last_class = Some(class);
                    if !continues_to_next_candidate(class) {
                        return Err(RouterFailure { reason: RouterFailureReason::Terminal(class), attempts });
                    }
                }
            }
        }

        Err(RouterFailure {
            reason: RouterFailureReason::Exhausted(last_class.unwrap_or(ErrorClass::RetryableTransient)),
            attempts,
        })
    }
}

fn outcome_for_class(class: ErrorClass) -> AttemptOutcome {
    match class {
        ErrorClass::RetryableTransient | ErrorClass::RetryableThrottled => AttemptOutcome::Retryable,
        ErrorClass::TerminalBadRequest | ErrorClass::TerminalPartial => AttemptOutcome::Terminal,
        ErrorClass::Deadline => AttemptOutcome::Deadline,
        ErrorClass::BreakerOpen => AttemptOutcome::BreakerOpen,
    }
}

/// Whether the Router should pop the next candidate after this failure.
/// Wider than `ErrorClass::is_retryable` (which only governs the breaker):
/// a per-attempt `Deadline` is not the provider's fault either and should
/// not end the request outright, provided the envelope deadline still
/// allows another attempt (checked separately at the top of the loop).
fn continues_to_next_candidate(class: ErrorClass) -> bool {
    matches!(
        class,
        ErrorClass::RetryableTransient | ErrorClass::RetryableThrottled | ErrorClass::Deadline
    )
}
