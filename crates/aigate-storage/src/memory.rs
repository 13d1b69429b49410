use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use aigate_common::{PrincipalId, QuotaKind, QuotaWindow, RequestId, TraceEvent, UsageRecord};

use crate::store::{BreakerSnapshot, Store, StorageResult, UsageFilter};

/// Process-local `Store` backed by `Vec`/`HashMap` behind a `Mutex`. Used
/// for tests and for running without a configured DSN; nothing here
/// survives a restart. Mirrors the teacher's sea-orm-backed `Storage` in
/// shape but with none of the batching `gproxy-storage`'s `StorageBus`
/// does for a real database, since there's no connection to amortize
/// round trips against.
#[derive(Default)]
pub struct InMemoryStore {
    usage: Mutex<Vec<UsageRecord>>,
    trace: Mutex<Vec<TraceEvent>>,
    quota: Mutex<HashMap<(PrincipalId, QuotaKind), QuotaWindow>>,
    breakers: Mutex<HashMap<String, BreakerSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn record_usage(&self, record: &UsageRecord) -> StorageResult<()> {
        self.usage.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_usage(&self, filter: &UsageFilter) -> StorageResult<Vec<UsageRecord>> {
        let usage = self.usage.lock().unwrap();
        let mut out: Vec<UsageRecord> = usage
            .iter()
            .filter(|record| {
                filter.principal.as_ref().is_none_or(|p| *p == record.principal)
                    && filter
                        .provider
                        .as_ref()
                        .is_none_or(|p| record.provider.as_deref() == Some(p.as_str()))
                    && filter.since.is_none_or(|since| record.completed_at >= since)
            })
            .cloned()
            .collect();
        if filter.limit > 0 && out.len() as u64 > filter.limit {
            out.truncate(filter.limit as usize);
        }
        Ok(out)
    }

    async fn record_trace_event(&self, event: &TraceEvent) -> StorageResult<()> {
        self.trace.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_trace_events(&self, request_id: RequestId) -> StorageResult<Vec<TraceEvent>> {
        let mut events: Vec<TraceEvent> = self
            .trace
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.request_id == request_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.ordinal);
        Ok(events)
    }

    async fn save_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
        window: &QuotaWindow,
    ) -> StorageResult<()> {
        self.quota
            .lock()
            .unwrap()
            .insert((principal.clone(), kind), window.clone());
        Ok(())
    }

    async fn load_quota_window(
        &self,
        principal: &PrincipalId,
        kind: QuotaKind,
    ) -> StorageResult<Option<QuotaWindow>> {
        Ok(self.quota.lock().unwrap().get(&(principal.clone(), kind)).cloned())
    }

    async fn save_breaker(&self, provider: &str, snapshot: &BreakerSnapshot) -> StorageResult<()> {
        self.breakers.lock().unwrap().insert(provider.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load_breaker(&self, provider: &str) -> StorageResult<Option<BreakerSnapshot>> {
        Ok(self.breakers.lock().unwrap().get(provider).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigate_common::{ApiFamily, QuotaWindowSpec, TraceEventKind, UsageStatus};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn sample_usage() -> UsageRecord {
        let now = OffsetDateTime::now_utc();
        UsageRecord {
            request_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            principal: "alice".to_string(),
            control_room: None,
            api_family: ApiFamily::Chat.as_str().to_string(),
            declared_model: "gpt-4o-mini".to_string(),
            provider: Some("openai-primary".to_string()),
            upstream_model: Some("gpt-4o-mini".to_string()),
            status: UsageStatus::Completed,
            prompt_tokens: 10,
            completion_tokens: 5,
            cost: None,
            error_code: None,
            error_message: None,
            attempt_count: 1,
            attempts: vec![],
            started_at: now,
            completed_at: now,
        }
    }

    #[tokio::test]
    async fn records_and_filters_usage_by_principal() {
        let store = InMemoryStore::new();
        store.record_usage(&sample_usage()).await.unwrap();
        let mut other = sample_usage();
        other.principal = "bob".to_string();
        store.record_usage(&other).await.unwrap();

        let filter = UsageFilter {
            principal: Some("alice".to_string()),
            ..Default::default()
        };
        let found = store.list_usage(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].principal, "alice");
    }

    #[tokio::test]
    async fn trace_events_come_back_ordered_by_ordinal() {
        let store = InMemoryStore::new();
        let request_id = Uuid::new_v4();
        let trace_id = Uuid::new_v4();
        let mut second = TraceEvent::new(
            request_id,
            trace_id,
            "alice".to_string(),
            OffsetDateTime::now_utc(),
            "router",
            TraceEventKind::Routed { candidate_count: 2 },
        );
        second.ordinal = 1;
        let mut first = TraceEvent::new(
            request_id,
            trace_id,
            "alice".to_string(),
            OffsetDateTime::now_utc(),
            "gateway",
            TraceEventKind::Accepted {
                api_family: "chat".to_string(),
                declared_model: "gpt-4o-mini".to_string(),
            },
        );
        first.ordinal = 0;

        store.record_trace_event(&second).await.unwrap();
        store.record_trace_event(&first).await.unwrap();

        let events = store.list_trace_events(request_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ordinal, 0);
        assert_eq!(events[1].ordinal, 1);
    }

    #[tokio::test]
    async fn quota_window_round_trips() {
        let store = InMemoryStore::new();
        let spec = QuotaWindowSpec {
            kind: QuotaKind::Tokens,
            period_secs: 3600,
            limit: 1_000,
        };
        let window = QuotaWindow::new(spec, 0);
        store
            .save_quota_window(&"alice".to_string(), QuotaKind::Tokens, &window)
            .await
            .unwrap();
        let loaded = store
            .load_quota_window(&"alice".to_string(), QuotaKind::Tokens)
            .await
            .unwrap();
        assert_eq!(loaded, Some(window));
    }
}
