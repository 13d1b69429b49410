use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use aigate_common::{PrincipalId, QuotaKind, QuotaWindow, RequestId, TraceEvent, UsageRecord};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Wall-clock snapshot of a `CircuitStatus` (§4.3). `CircuitStatus` itself
/// keys timing off `Instant`, which carries no meaning across a process
/// restart, so a reload conservatively treats any breaker found `open` or
/// `half_open` as freshly opened as of `reopened_at` rather than trying to
/// recover how much of the original cooldown had already elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: aigate_common::CircuitState,
    pub consecutive_failures: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub reopened_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub principal: Option<PrincipalId>,
    pub provider: Option<String>,
    pub since: Option<OffsetDateTime>,
    pub limit: u64,
}

/// Persistence for the four tables this core owns (§6): usage records,
/// trace events, quota window snapshots and circuit breaker snapshots.
/// Everything else named in the admin surface — workspaces, users, api
/// keys, provider configuration — belongs to an external auth/admin
/// collaborator and has no home in this trait.
#[async_trait]
pub trait Store: Send + Sync {
    async fn record_usage(&self, record: &UsageRecord) -> StorageResult<()>;

    async fn list_usage(&self, filter: &UsageFilter) -> StorageResult<Vec<UsageRecord>>;

    /// Persists a trace event. The caller has already assigned `ordinal`;
    /// the store never reorders or renumbers.
    async fn record_trace_event(&self, event: &TraceEvent) -> StorageResult<()>;

    async fn list_trace_events(&self, request_id: RequestId) -> StorageResult<Vec<TraceEvent>>;

    async fn save_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
        window: &QuotaWindow,
    ) -> StorageResult<()>;

    async fn load_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
    ) -> StorageResult<Option<QuotaWindow>>;

    async fn save_breaker(&self, provider: &str, snapshot: &BreakerSnapshot) -> StorageResult<()>;

    async fn load_breaker(&self, provider: &str) -> StorageResult<Option<BreakerSnapshot>>;
}
