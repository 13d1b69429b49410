use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use aigate_common::{Attempt, ErrorClass, RequestEnvelope, TraceEventKind, UsageRecord, UsageStatus};
use aigate_provider_core::ChunkEvent;
use aigate_router::{Router, RouterFailureReason};
use aigate_transform::{Proto, TransformError};

use crate::bus::StreamingEventBus;
use crate::quota::{estimate_for_request, unix_now, QuotaEnforcer};
use crate::trace::TraceStore;
use crate::usage::UsageSink;

/// Per-model routing metadata the Gateway needs beyond what the Router's
/// own `RouteTable` tracks: how many candidates exist (for the `routed`
/// TraceEvent) and which wire family candidates for this model expect, so
/// the Gateway can convert the client's declared body into it before
/// handing off to the Router. Candidates for one declared model are
/// assumed to share a single upstream wire family (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct ModelRoute {
    pub candidate_count: usize,
    pub target_proto: Proto,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway/unknown-route: no candidates for declared model")]
    UnknownRoute,
    #[error("{0}")]
    QuotaExceeded(#[from] crate::quota::QuotaExceeded),
    #[error("gateway/deadline: deadline reached before completion")]
    Deadline,
    #[error("upstream/unavailable: {0:?}")]
    Unavailable(ErrorClass),
    #[error("upstream/bad-request: {0:?}")]
    BadRequest(ErrorClass),
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
}

pub struct GatewayOutcome {
    pub provider: String,
    pub upstream_model: String,
    pub body: Value,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub attempts: Vec<Attempt>,
}

/// The per-request orchestrator (§4.5). Ties the Router, Quota Enforcer,
/// Usage Sink, Trace Store and Streaming Event Bus together; owns nothing
/// that outlives a single request except the shared collaborators passed
/// into its constructor (§9: explicit collaborators, no ambient
/// singletons).
pub struct Gateway {
    router: Arc<Router>,
    model_routes: HashMap<String, ModelRoute>,
    quota: Arc<QuotaEnforcer>,
    usage: Arc<UsageSink>,
    trace: Arc<TraceStore>,
    bus: Arc<StreamingEventBus>,
}

impl Gateway {
    pub fn new(
        router: Arc<Router>,
        model_routes: HashMap<String, ModelRoute>,
        quota: Arc<QuotaEnforcer>,
        usage: Arc<UsageSink>,
        trace: Arc<TraceStore>,
        bus: Arc<StreamingEventBus>,
    ) -> Self {
        Self { router, model_routes, quota, usage, trace, bus }
    }

    fn proto_for(&self, declared_model: &str, fallback: Proto) -> Proto {
        self.model_routes.get(declared_model).map(|r| r.target_proto).unwrap_or(fallback)
    }

    /// Exposes the active `Router` for admin-surface reads (breaker
    /// snapshots). The admin crate never drives requests through it
    /// directly; it only reads state.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Non-streaming request execution (§4.5 steps 1-6).
    pub async fn execute(
        &self,
        envelope: RequestEnvelope,
        declared_proto: Proto,
        body: Value,
    ) -> Result<GatewayOutcome, GatewayError> {
        let started_at = time::OffsetDateTime::now_utc();
        self.trace
            .append(
                envelope.request_id,
                envelope.trace_id,
                envelope.principal.clone(),
                "gateway",
                TraceEventKind::Accepted {
                    api_family: envelope.api_family.as_str().to_string(),
                    declared_model: envelope.declared_model.clone(),
                },
            )
            .await;

        let candidate_count = self
            .model_routes
            .get(&envelope.declared_model)
            .map(|r| r.candidate_count)
            .unwrap_or(0);

        let estimate = estimate_for_request(estimate_input_size(&body));
        let reservation = match self.quota.reserve(&envelope.principal, &estimate, unix_now()).await {
            Ok(id) => id,
            Err(err) => {
                self.reject(&envelope, "quota").await;
                self.emit_usage(&envelope, started_at, None, None, UsageStatus::Rejected, None, 0, Vec::new())
                    .await;
                return Err(err.into());
            }
        };
        self.emit_quota_reserved(&envelope, reservation, &estimate).await;

        if candidate_count == 0 {
            self.quota.refund(reservation).await;
            self.emit_quota_refunded(&envelope, reservation, &estimate).await;
            self.reject(&envelope, "unknown-route").await;
            self.emit_usage(&envelope, started_at, None, None, UsageStatus::Rejected, None, 0, Vec::new())
                .await;
            return Err(GatewayError::UnknownRoute);
        }

        self.trace
            .append(
                envelope.request_id,
                envelope.trace_id,
                envelope.principal.clone(),
                "router",
                TraceEventKind::Routed { candidate_count },
            )
            .await;

        let target_proto = self.proto_for(&envelope.declared_model, declared_proto);
        let wire_body = match aigate_transform::convert_request(
            declared_proto,
            target_proto,
            body,
            &envelope.declared_model,
            false,
        ) {
            Ok(body) => body,
            Err(err) => {
                self.quota.refund(reservation).await;
                self.emit_quota_refunded(&envelope, reservation, &estimate).await;
                self.reject(&envelope, "transform").await;
                self.emit_usage(
                    &envelope,
                    started_at,
                    None,
                    None,
                    UsageStatus::Rejected,
                    Some(err.to_string()),
                    0,
                    Vec::new(),
                )
                .await;
                return Err(err.into());
            }
        };

        let result = self
            .router
            .execute(&envelope.request_id.to_string(), &envelope.declared_model, wire_body, envelope.deadline)
            .await;
        self.emit_breaker_transitions(&envelope).await;

        match result {
            Ok(success) => {
                for attempt in &success.attempts {
                    self.emit_attempt_trace(&envelope, attempt).await;
                }

                let actual_tokens = success.outcome.prompt_tokens + success.outcome.completion_tokens;
                self.quota
                    .commit(reservation, &[(aigate_common::QuotaKind::Requests, 1), (aigate_common::QuotaKind::Tokens, actual_tokens)])
                    .await;
                self.emit_quota_overrun_if_any(&envelope, &estimate, actual_tokens).await;

                let response_body = aigate_transform::convert_response(
                    target_proto,
                    declared_proto,
                    success.outcome.body,
                    &envelope.request_id.to_string(),
                    &success.upstream_model,
                )?;

                self.trace
                    .append(
                        envelope.request_id,
                        envelope.trace_id,
                        envelope.principal.clone(),
                        "gateway",
                        TraceEventKind::Completed { status: "completed".to_string(), streamed: false },
                    )
                    .await;

                self.emit_usage(
                    &envelope,
                    started_at,
                    Some(success.provider.clone()),
                    Some(success.upstream_model.clone()),
                    UsageStatus::Completed,
                    None,
                    success.attempts.len() as u32,
                    success.attempts.clone(),
                )
                .await;

                Ok(GatewayOutcome {
                    provider: success.provider,
                    upstream_model: success.upstream_model,
                    body: response_body,
                    prompt_tokens: success.outcome.prompt_tokens,
                    completion_tokens: success.outcome.completion_tokens,
                    attempts: success.attempts,
                })
            }
            Err(failure) => {
                for attempt in &failure.attempts {
                    self.emit_attempt_trace(&envelope, attempt).await;
                }

                self.quota.refund(reservation).await;
                self.emit_quota_refunded(&envelope, reservation, &estimate).await;
                self.reject(&envelope, "router").await;
                self.emit_usage(
                    &envelope,
                    started_at,
                    None,
                    None,
                    UsageStatus::Failed,
                    Some(failure.to_string()),
                    failure.attempts.len() as u32,
                    failure.attempts.clone(),
                )
                .await;

                Err(match failure.reason {
                    RouterFailureReason::NoRoute => GatewayError::UnknownRoute,
                    RouterFailureReason::Deadline => GatewayError::Deadline,
                    RouterFailureReason::Exhausted(class) => GatewayError::Unavailable(class),
                    RouterFailureReason::Terminal(class) => GatewayError::BadRequest(class),
                })
            }
        }
    }

    /// Streaming request execution (§4.5's streaming variant + §4.8).
    /// Returns the bus topic's primary receiver; the caller (the SSE
    /// handler in `apps/aigate`) drains it while this future keeps running
    /// the Router's streaming path to completion in the background.
    pub async fn execute_streaming(
        self: Arc<Self>,
        envelope: RequestEnvelope,
        declared_proto: Proto,
        body: Value,
        primary_deadline: Duration,
    ) -> Result<tokio::sync::mpsc::Receiver<ChunkEvent>, GatewayError> {
        let started_at = time::OffsetDateTime::now_utc();
        self.trace
            .append(
                envelope.request_id,
                envelope.trace_id,
                envelope.principal.clone(),
                "gateway",
                TraceEventKind::Accepted {
                    api_family: envelope.api_family.as_str().to_string(),
                    declared_model: envelope.declared_model.clone(),
                },
            )
            .await;

        let candidate_count = self
            .model_routes
            .get(&envelope.declared_model)
            .map(|r| r.candidate_count)
            .unwrap_or(0);

        let estimate = estimate_for_request(estimate_input_size(&body));
        let reservation = match self.quota.reserve(&envelope.principal, &estimate, unix_now()).await {
            Ok(id) => id,
            Err(err) => {
                self.reject(&envelope, "quota").await;
                self.emit_usage(&envelope, started_at, None, None, UsageStatus::Rejected, None, 0, Vec::new())
                    .await;
                return Err(err.into());
            }
        };
        self.emit_quota_reserved(&envelope, reservation, &estimate).await;

        if candidate_count == 0 {
            self.quota.refund(reservation).await;
            self.emit_quota_refunded(&envelope, reservation, &estimate).await;
            self.reject(&envelope, "unknown-route").await;
            self.emit_usage(&envelope, started_at, None, None, UsageStatus::Rejected, None, 0, Vec::new())
                .await;
            return Err(GatewayError::UnknownRoute);
        }

        self.trace
            .append(
                envelope.request_id,
                envelope.trace_id,
                envelope.principal.clone(),
                "router",
                TraceEventKind::Routed { candidate_count },
            )
            .await;

        let target_proto = self.proto_for(&envelope.declared_model, declared_proto);
        let wire_body = match aigate_transform::convert_request(
            declared_proto,
            target_proto,
            body,
            &envelope.declared_model,
            true,
        ) {
            Ok(body) => body,
            Err(err) => {
                self.quota.refund(reservation).await;
                self.emit_quota_refunded(&envelope, reservation, &estimate).await;
                self.reject(&envelope, "transform").await;
                self.emit_usage(
                    &envelope,
                    started_at,
                    None,
                    None,
                    UsageStatus::Rejected,
                    Some(err.to_string()),
                    0,
                    Vec::new(),
                )
                .await;
                return Err(err.into());
            }
        };

        let topic = self.bus.create_topic(envelope.request_id);
        let client_rx = topic.subscribe("primary", true, primary_deadline);

        let gateway = self.clone();
        let request_id = envelope.request_id;
        tokio::spawn(async move {
            let result = gateway
                .router
                .execute_streaming(
                    &envelope.request_id.to_string(),
                    &envelope.declared_model,
                    wire_body,
                    envelope.deadline,
                    topic.as_ref(),
                )
                .await;
            gateway.emit_breaker_transitions(&envelope).await;

            for id in topic.take_dropped() {
                gateway
                    .trace
                    .append(
                        envelope.request_id,
                        envelope.trace_id,
                        envelope.principal.clone(),
                        "bus",
                        TraceEventKind::SubscriberDropped { subscriber: id },
                    )
                    .await;
            }

            match result {
                Ok(success) => {
                    for attempt in &success.attempts {
                        gateway.emit_attempt_trace(&envelope, attempt).await;
                    }
                    let actual_tokens =
                        success.completion.prompt_tokens + success.completion.completion_tokens;
                    gateway
                        .quota
                        .commit(
                            reservation,
                            &[(aigate_common::QuotaKind::Requests, 1), (aigate_common::QuotaKind::Tokens, actual_tokens)],
                        )
                        .await;
                    gateway.emit_quota_overrun_if_any(&envelope, &estimate, actual_tokens).await;
                    gateway
                        .trace
                        .append(
                            envelope.request_id,
                            envelope.trace_id,
                            envelope.principal.clone(),
                            "gateway",
                            TraceEventKind::Completed { status: "completed".to_string(), streamed: true },
                        )
                        .await;
                    gateway
                        .emit_usage(
                            &envelope,
                            started_at,
                            Some(success.provider),
                            Some(success.upstream_model),
                            UsageStatus::Completed,
                            None,
                            success.attempts.len() as u32,
                            success.attempts,
                        )
                        .await;
                }
                Err(failure) => {
                    for attempt in &failure.attempts {
                        gateway.emit_attempt_trace(&envelope, attempt).await;
                    }
                    gateway.quota.refund(reservation).await;
                    gateway.emit_quota_refunded(&envelope, reservation, &estimate).await;
                    let truncated = topic.delivered_count() > 0;
                    let status = if truncated { UsageStatus::Partial } else { UsageStatus::Failed };
                    gateway
                        .trace
                        .append(
                            envelope.request_id,
                            envelope.trace_id,
                            envelope.principal.clone(),
                            "gateway",
                            TraceEventKind::Rejected { reason: failure.to_string() },
                        )
                        .await;
                    gateway
                        .emit_usage(
                            &envelope,
                            started_at,
                            None,
                            None,
                            status,
                            Some(failure.to_string()),
                            failure.attempts.len() as u32,
                            failure.attempts,
                        )
                        .await;
                }
            }
            gateway.bus.remove_topic(request_id);
        });

        Ok(client_rx)
    }

    async fn emit_quota_reserved(
        &self,
        envelope: &RequestEnvelope,
        reservation: aigate_common::QuotaReservationId,
        estimate: &[(aigate_common::QuotaKind, u64)],
    ) {
        for (kind, amount) in estimate {
            self.trace
                .append(
                    envelope.request_id,
                    envelope.trace_id,
                    envelope.principal.clone(),
                    "quota",
                    TraceEventKind::QuotaReserved {
                        reservation_id: reservation.to_string(),
                        window_kind: format!("{kind:?}").to_lowercase(),
                        amount: *amount,
                    },
                )
                .await;
        }
    }

    async fn emit_quota_refunded(
        &self,
        envelope: &RequestEnvelope,
        reservation: aigate_common::QuotaReservationId,
        estimate: &[(aigate_common::QuotaKind, u64)],
    ) {
        for (kind, _) in estimate {
            self.trace
                .append(
                    envelope.request_id,
                    envelope.trace_id,
                    envelope.principal.clone(),
                    "quota",
                    TraceEventKind::QuotaRefunded {
                        reservation_id: reservation.to_string(),
                        window_kind: format!("{kind:?}").to_lowercase(),
                    },
                )
                .await;
        }
    }

    /// Compares the token estimate reserved before dispatch against what the
    /// chosen candidate actually reported, emitting `quota/overrun` (§4.4)
    /// when actual consumption ran past the estimate. The window itself is
    /// never rolled back for this — `QuotaEnforcer::commit` already let it
    /// run over; this only makes the overrun observable in the trace.
    async fn emit_quota_overrun_if_any(&self, envelope: &RequestEnvelope, estimate: &[(aigate_common::QuotaKind, u64)], actual_tokens: u64) {
        let Some((_, estimated_tokens)) =
            estimate.iter().find(|(kind, _)| *kind == aigate_common::QuotaKind::Tokens)
        else {
            return;
        };
        if actual_tokens > *estimated_tokens {
            self.trace
                .append(
                    envelope.request_id,
                    envelope.trace_id,
                    envelope.principal.clone(),
                    "quota",
                    TraceEventKind::QuotaOverrun {
                        window_kind: "tokens".to_string(),
                        estimate: *estimated_tokens,
                        actual: actual_tokens,
                    },
                )
                .await;
        }
    }

    async fn emit_breaker_transitions(&self, envelope: &RequestEnvelope) {
        for transition in self.router.take_transitions() {
            let kind = if transition.opened {
                TraceEventKind::BreakerOpened { provider: transition.provider }
            } else {
                TraceEventKind::BreakerClosed { provider: transition.provider }
            };
            self.trace
                .append(envelope.request_id, envelope.trace_id, envelope.principal.clone(), "breaker", kind)
                .await;
        }
    }

    async fn emit_attempt_trace(&self, envelope: &RequestEnvelope, attempt: &Attempt) {
        let kind = match attempt.outcome {
            Some(aigate_common::AttemptOutcome::Success) => TraceEventKind::AttemptSucceeded {
                provider: attempt.candidate.provider.clone(),
                prompt_tokens: attempt.prompt_tokens.unwrap_or(0),
                completion_tokens: attempt.completion_tokens.unwrap_or(0),
            },
            _ => TraceEventKind::AttemptFailed {
                provider: attempt.candidate.provider.clone(),
                error_class: attempt.error_class.map(|c| format!("{c:?}")).unwrap_or_default(),
                message: String::new(),
            },
        };
        self.trace
            .append(envelope.request_id, envelope.trace_id, envelope.principal.clone(), "router", kind)
            .await;
    }

    async fn reject(&self, envelope: &RequestEnvelope, reason: &str) {
        self.trace
            .append(
                envelope.request_id,
                envelope.trace_id,
                envelope.principal.clone(),
                "gateway",
                TraceEventKind::Rejected { reason: reason.to_string() },
            )
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_usage(
        &self,
        envelope: &RequestEnvelope,
        started_at: time::OffsetDateTime,
        provider: Option<String>,
        upstream_model: Option<String>,
        status: UsageStatus,
        error_message: Option<String>,
        attempt_count: u32,
        attempts: Vec<Attempt>,
    ) {
        let completed_at = time::OffsetDateTime::now_utc();
        let prompt_tokens = attempts.iter().filter_map(|a| a.prompt_tokens).sum();
        let completion_tokens = attempts.iter().filter_map(|a| a.completion_tokens).sum();
        let record = UsageRecord {
            request_id: envelope.request_id,
            trace_id: envelope.trace_id,
            principal: envelope.principal.clone(),
            control_room: envelope.control_room.clone(),
            api_family: envelope.api_family.as_str().to_string(),
            declared_model: envelope.declared_model.clone(),
            provider,
            upstream_model,
            status,
            prompt_tokens,
            completion_tokens,
            cost: None,
            error_code: None,
            error_message,
            attempt_count,
            attempts: attempts.iter().map(Attempt::compact).collect(),
            started_at,
            completed_at,
        };
        self.usage.record(record).await;
    }
}

fn estimate_input_size(body: &Value) -> u64 {
    serde_json::to_vec(body).map(|bytes| bytes.len() as u64).unwrap_or(0)
}
