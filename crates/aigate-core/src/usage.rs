use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use aigate_common::UsageRecord;
use aigate_storage::{Store, UsageFilter};

const DEFAULT_CAPACITY: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct UsageAggregate {
    pub request_count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

/// Bounded ring buffer of `UsageRecord`s plus an optional spill to `Store`
/// (§4.6). `durable` mirrors the teacher's choice between a
/// fire-and-forget `DbEventSink` and a write-before-acknowledge sink: when
/// true, `record` awaits the store write before returning; when false, the
/// write happens on a detached task and `record` never blocks on storage
/// I/O.
pub struct UsageSink {
    store: Arc<dyn Store>,
    durable: bool,
    capacity: usize,
    buffer: Mutex<VecDeque<UsageRecord>>,
}

impl UsageSink {
    pub fn new(store: Arc<dyn Store>, durable: bool) -> Self {
        Self::with_capacity(store, durable, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn Store>, durable: bool, capacity: usize) -> Self {
        Self {
            store,
            durable,
            capacity,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, record: UsageRecord) {
        if self.durable {
            if let Err(err) = self.store.record_usage(&record).await {
                tracing::warn!(event = "usage_spill_failed", request_id = %record.request_id, error = %err);
            }
            self.buffer_push(record);
            return;
        }

        self.buffer_push(record.clone());
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.record_usage(&record).await {
                tracing::warn!(event = "usage_spill_failed", request_id = %record.request_id, error = %err);
            }
        });
    }

    fn buffer_push(&self, record: UsageRecord) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push_back(record);
        if buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// Most recent `limit` records, newest first.
    pub fn list(&self, limit: usize) -> Vec<UsageRecord> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().rev().take(limit).cloned().collect()
    }

    /// Sums tokens and cost per principal over `[since, now]`. Delegates to
    /// `Store` so it covers records already evicted from the in-memory
    /// ring, not just what's currently buffered.
    pub async fn aggregate_by_principal(&self, since: OffsetDateTime) -> HashMap<String, UsageAggregate> {
        let filter = UsageFilter { since: Some(since), limit: 0, ..Default::default() };
        let records = self.store.list_usage(&filter).await.unwrap_or_default();
        let mut out: HashMap<String, UsageAggregate> = HashMap::new();
        for record in records {
            let entry = out.entry(record.principal.clone()).or_default();
            entry.request_count += 1;
            entry.prompt_tokens += record.prompt_tokens;
            entry.completion_tokens += record.completion_tokens;
            entry.cost += record.cost.unwrap_or(0.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigate_common::{ApiFamily, UsageStatus};
    use aigate_storage::InMemoryStore;
    use uuid::Uuid;

    fn record(principal: &str) -> UsageRecord {
        let now = OffsetDateTime::now_utc();
        UsageRecord {
            request_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            principal: principal.to_string(),
            control_room: None,
            api_family: ApiFamily::Chat.as_str().to_string(),
            declared_model: "gpt-4o-mini".to_string(),
            provider: Some("openai-primary".to_string()),
            upstream_model: Some("gpt-4o-mini".to_string()),
            status: UsageStatus::Completed,
            prompt_tokens: 10,
            completion_tokens: 5,
            cost: Some(0.01),
            error_code: None,
            error_message: None,
            attempt_count: 1,
            attempts: vec![],
            started_at: now,
            completed_at: now,
        }
    }

    #[tokio::test]
    async fn list_returns_most_recent_first() {
        let sink = UsageSink::new(Arc::new(InMemoryStore::new()), true);
        sink.record(record("alice")).await;
        sink.record(record("bob")).await;

        let listed = sink.list(10);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].principal, "bob");
    }

    #[tokio::test]
    async fn eviction_keeps_buffer_at_capacity() {
        let sink = UsageSink::with_capacity(Arc::new(InMemoryStore::new()), true, 2);
        sink.record(record("a")).await;
        sink.record(record("b")).await;
        sink.record(record("c")).await;

        assert_eq!(sink.list(10).len(), 2);
    }

    #[tokio::test]
    async fn durable_record_is_queryable_from_store_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let sink = UsageSink::new(store.clone(), true);
        sink.record(record("alice")).await;

        let aggregate = sink.aggregate_by_principal(OffsetDateTime::UNIX_EPOCH).await;
        assert_eq!(aggregate.get("alice").unwrap().request_count, 1);
    }
}
