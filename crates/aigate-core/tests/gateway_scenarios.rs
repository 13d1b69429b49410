//! End-to-end Gateway scenarios from spec §8, wired up with `MockAdapter`
//! and `InMemoryStore` in place of live credentials and a database. Each
//! test drives `Gateway::execute`/`execute_streaming` and asserts the
//! testable properties directly: at-most-one-billable, trace completeness,
//! retry bound, failover-before-first-byte, and quota conservation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aigate_common::{ApiFamily, QuotaKind, QuotaWindowSpec, RequestEnvelope, UsageStatus};
use aigate_core::quota::PrincipalQuotaConfig;
use aigate_core::{Gateway, ModelRoute, QuotaEnforcer, StreamingEventBus, TraceStore, UsageSink};
use aigate_provider_core::AdapterRegistry;
use aigate_provider_impl::{MockAdapter, MockFailure, Scripted};
use aigate_router::{Router, RouterConfig};
use aigate_storage::{InMemoryStore, Store};
use aigate_transform::Proto;
use uuid::Uuid;

fn envelope(declared_model: &str, principal: &str, deadline: Duration) -> RequestEnvelope {
    let now = Instant::now();
    RequestEnvelope::new(
        Uuid::new_v4(),
        ApiFamily::Chat,
        declared_model,
        principal.to_string(),
        None,
        BTreeSet::new(),
        now,
        now + deadline,
    )
}

struct Harness {
    gateway: Arc<Gateway>,
    store: Arc<InMemoryStore>,
    quota: Arc<QuotaEnforcer>,
}

fn build(
    adapters: Vec<(&str, Vec<Scripted>)>,
    candidates: Vec<aigate_common::attempt::Candidate>,
    model: &str,
    breaker: aigate_common::breaker::BreakerParams,
) -> Harness {
    let mut registry = AdapterRegistry::new();
    for (name, script) in adapters {
        registry.register(Arc::new(MockAdapter::new(name, script)));
    }
    let mut routes = aigate_router::RouteTable::new();
    let candidate_count = candidates.len();
    routes.set_route(model, candidates);
    let router = Arc::new(Router::new(
        Arc::new(registry),
        routes,
        move |_| breaker,
        RouterConfig { retry_budget: 2, per_attempt_ceiling: Duration::from_secs(5) },
    ));

    let store = Arc::new(InMemoryStore::new());
    let quota = Arc::new(QuotaEnforcer::new(store.clone()));
    let usage = Arc::new(UsageSink::new(store.clone(), true));
    let trace = Arc::new(TraceStore::new(store.clone()));
    let bus = Arc::new(StreamingEventBus::new());

    let mut model_routes = HashMap::new();
    model_routes.insert(model.to_string(), ModelRoute { candidate_count, target_proto: Proto::OpenAi });

    let gateway = Arc::new(Gateway::new(router, model_routes, quota.clone(), usage, trace, bus));
    Harness { gateway, store, quota }
}

fn default_breaker() -> aigate_common::breaker::BreakerParams {
    aigate_common::breaker::BreakerParams { failure_threshold: 2, success_threshold: 3, open_duration_secs: 60, half_open_ceiling: 3 }
}

async fn trace_kinds(store: &InMemoryStore, request_id: uuid::Uuid) -> Vec<String> {
    store
        .list_trace_events(request_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| format!("{:?}", e.kind))
        .collect()
}

#[tokio::test]
async fn scenario_happy_path_single_attempt() {
    let harness = build(
        vec![("a", vec![Scripted::Ok { prompt_tokens: 10, completion_tokens: 5 }])],
        vec![aigate_common::attempt::Candidate::new("a", "m", 100, 0)],
        "m",
        default_breaker(),
    );
    let env = envelope("m", "alice", Duration::from_secs(5));
    let request_id = env.request_id;

    let outcome = harness
        .gateway
        .execute(env, Proto::OpenAi, serde_json::json!({"model": "m", "messages": []}))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "a");
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.prompt_tokens, 10);
    assert_eq!(outcome.completion_tokens, 5);

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1, "at-most-one-billable: exactly one UsageRecord");
    assert_eq!(usage[0].status, UsageStatus::Completed);
    assert_eq!(usage[0].provider.as_deref(), Some("a"));

    let kinds = trace_kinds(&harness.store, request_id).await;
    assert!(kinds.first().unwrap().starts_with("Accepted"));
    assert!(kinds.last().unwrap().starts_with("Completed"));
}

#[tokio::test]
async fn scenario_failover_on_retryable_failure() {
    let harness = build(
        vec![
            ("a", vec![Scripted::Fail(MockFailure::Transient)]),
            ("b", vec![Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 }]),
        ],
        vec![
            aigate_common::attempt::Candidate::new("a", "m", 100, 0),
            aigate_common::attempt::Candidate::new("b", "m", 100, 1),
        ],
        "m",
        default_breaker(),
    );
    let env = envelope("m", "alice", Duration::from_secs(5));
    let request_id = env.request_id;

    let outcome = harness
        .gateway
        .execute(env, Proto::OpenAi, serde_json::json!({"model": "m", "messages": []}))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "b");
    assert_eq!(outcome.attempts.len(), 2);

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].provider.as_deref(), Some("b"));

    let kinds = trace_kinds(&harness.store, request_id).await;
    let failed_idx = kinds.iter().position(|k| k.starts_with("AttemptFailed")).unwrap();
    let started_idx = kinds.iter().rposition(|k| k.starts_with("AttemptSucceeded")).unwrap();
    assert!(failed_idx < started_idx, "attempt-failed(A) must precede attempt-succeeded(B)");
}

#[tokio::test]
async fn scenario_quota_rejection_still_emits_one_usage_record() {
    let harness = build(
        vec![("a", vec![Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 }])],
        vec![aigate_common::attempt::Candidate::new("a", "m", 100, 0)],
        "m",
        default_breaker(),
    );

    let principal = "limited".to_string();
    let mut config = PrincipalQuotaConfig::new();
    config.insert(QuotaKind::Requests, QuotaWindowSpec { kind: QuotaKind::Requests, period_secs: 60, limit: 0 });
    harness.quota.configure_principal(&principal, &config, 0);

    let env = envelope("m", &principal, Duration::from_secs(5));
    let request_id = env.request_id;

    let err = harness
        .gateway
        .execute(env, Proto::OpenAi, serde_json::json!({"model": "m", "messages": []}))
        .await
        .unwrap_err();
    assert!(matches!(err, aigate_core::GatewayError::QuotaExceeded(_)));

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1, "quota rejection still produces exactly one UsageRecord");
    assert_eq!(usage[0].status, UsageStatus::Rejected);
    assert_eq!(usage[0].attempt_count, 0);
    assert_eq!(usage[0].prompt_tokens, 0);
    assert_eq!(usage[0].completion_tokens, 0);

    let kinds = trace_kinds(&harness.store, request_id).await;
    assert_eq!(kinds.len(), 2, "accepted + rejected(quota), no quota-reserved since reserve itself failed");
    assert!(kinds[0].starts_with("Accepted"));
    assert!(kinds[1].starts_with("Rejected"));
}

#[tokio::test]
async fn scenario_unknown_route_is_rejected_with_one_usage_record() {
    let harness = build(vec![], vec![], "m", default_breaker());
    let env = envelope("unrouted-model", "alice", Duration::from_secs(5));
    let request_id = env.request_id;

    let err = harness
        .gateway
        .execute(env, Proto::OpenAi, serde_json::json!({"model": "unrouted-model"}))
        .await
        .unwrap_err();
    assert!(matches!(err, aigate_core::GatewayError::UnknownRoute));

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1, "rejected requests still get exactly one UsageRecord");
    assert_eq!(usage[0].status, UsageStatus::Rejected);
    assert_eq!(usage[0].attempt_count, 0);

    let kinds = trace_kinds(&harness.store, request_id).await;
    assert!(kinds.first().unwrap().starts_with("Accepted"));
    assert!(kinds.last().unwrap().starts_with("Rejected"));
}

#[tokio::test]
async fn scenario_retry_bound_caps_attempts_and_rejects() {
    let harness = build(
        vec![
            ("a", vec![Scripted::Fail(MockFailure::Transient)]),
            ("b", vec![Scripted::Fail(MockFailure::Transient)]),
            ("c", vec![Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 }]),
        ],
        vec![
            aigate_common::attempt::Candidate::new("a", "m", 100, 0),
            aigate_common::attempt::Candidate::new("b", "m", 100, 1),
            aigate_common::attempt::Candidate::new("c", "m", 100, 2),
        ],
        "m",
        default_breaker(),
    );
    let env = envelope("m", "alice", Duration::from_secs(5));

    let err = harness
        .gateway
        .execute(env, Proto::OpenAi, serde_json::json!({"model": "m", "messages": []}))
        .await
        .unwrap_err();
    assert!(matches!(err, aigate_core::GatewayError::Unavailable(_)));

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].attempt_count, 2, "retry bound R=2 caps attempts");
    assert_eq!(usage[0].status, UsageStatus::Failed);
}

#[tokio::test]
async fn scenario_streaming_truncation_does_not_fail_over() {
    let harness = build(
        vec![
            (
                "a",
                vec![Scripted::StreamPartial {
                    chunks: vec!["hel".to_string(), "lo".to_string()],
                    failure: MockFailure::DeadlinePartial,
                }],
            ),
            ("b", vec![Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 }]),
        ],
        vec![
            aigate_common::attempt::Candidate::new("a", "m", 100, 0),
            aigate_common::attempt::Candidate::new("b", "m", 100, 1),
        ],
        "m",
        default_breaker(),
    );
    let env = envelope("m", "alice", Duration::from_secs(5));
    let request_id = env.request_id;

    let mut rx = harness
        .gateway
        .clone()
        .execute_streaming(env, Proto::OpenAi, serde_json::json!({"model": "m", "messages": []}), Duration::from_millis(200))
        .await
        .unwrap();

    let mut received = 0;
    while rx.recv().await.is_some() {
        received += 1;
    }
    assert_eq!(received, 2, "2 delta chunks, then the stream dies mid-response");

    // The background task finishes shortly after the channel drains.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 1, "exactly one UsageRecord even for a streamed request");
    assert_eq!(usage[0].status, UsageStatus::Partial);
    assert_eq!(usage[0].attempt_count, 1, "no failover to b once chunks reached the sink");
    assert_eq!(usage[0].attempts[0].provider, "a");

    let kinds = trace_kinds(&harness.store, request_id).await;
    assert!(!kinds.iter().any(|k| k.starts_with("AttemptFailed")));
    assert!(!kinds.iter().any(|k| k.starts_with("AttemptStarted") && k.contains('b')));
}

#[tokio::test]
async fn scenario_breaker_opens_and_routes_around_provider() {
    let harness = build(
        vec![
            ("a", vec![Scripted::Fail(MockFailure::Transient), Scripted::Fail(MockFailure::Transient)]),
            (
                "b",
                vec![
                    Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 },
                    Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 },
                    Scripted::Ok { prompt_tokens: 1, completion_tokens: 1 },
                ],
            ),
        ],
        vec![
            aigate_common::attempt::Candidate::new("a", "m", 100, 0),
            aigate_common::attempt::Candidate::new("b", "m", 100, 1),
        ],
        "m",
        aigate_common::breaker::BreakerParams { failure_threshold: 2, success_threshold: 3, open_duration_secs: 60, half_open_ceiling: 3 },
    );

    let _ = harness
        .gateway
        .execute(envelope("m", "alice", Duration::from_secs(5)), Proto::OpenAi, serde_json::json!({"model": "m"}))
        .await;
    let _ = harness
        .gateway
        .execute(envelope("m", "alice", Duration::from_secs(5)), Proto::OpenAi, serde_json::json!({"model": "m"}))
        .await;
    assert_eq!(harness.gateway.router().breaker_state("a"), Some(aigate_common::breaker::CircuitState::Open));

    let outcome = harness
        .gateway
        .execute(envelope("m", "alice", Duration::from_secs(5)), Proto::OpenAi, serde_json::json!({"model": "m"}))
        .await
        .unwrap();
    assert_eq!(outcome.provider, "b");
    assert_eq!(outcome.attempts.len(), 1, "a's open breaker means it's skipped, not attempted");

    let usage = harness.store.list_usage(&Default::default()).await.unwrap();
    assert_eq!(usage.len(), 3, "one UsageRecord per request, including the two that tripped the breaker");
}
