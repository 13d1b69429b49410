use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use aigate_common::{PrincipalId, RequestId, TraceEvent, TraceEventKind, TraceId};
use aigate_storage::Store;

const DEFAULT_PER_REQUEST_CAP: usize = 500;
const DEFAULT_GLOBAL_RING: usize = 4000;

struct RequestTrace {
    events: VecDeque<TraceEvent>,
    next_ordinal: u64,
    compacted: u64,
}

/// Two-tier bounded event log (§4.7): a per-request ordered list capped at
/// `per_request_cap` (oldest events coalesced into a `compacted` marker on
/// overflow) and a global ring of the most recently active request ids,
/// capped at `global_ring`. Every event is additionally spilled to the
/// configured `Store`, best-effort — storage failures are logged, never
/// surfaced to the request path (§7: "usage recording and trace writing
/// errors never fail the request").
pub struct TraceStore {
    store: Arc<dyn Store>,
    per_request_cap: usize,
    global_ring: usize,
    requests: Mutex<HashMap<RequestId, RequestTrace>>,
    recent: Mutex<VecDeque<RequestId>>,
}

impl TraceStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_capacity(store, DEFAULT_PER_REQUEST_CAP, DEFAULT_GLOBAL_RING)
    }

    pub fn with_capacity(store: Arc<dyn Store>, per_request_cap: usize, global_ring: usize) -> Self {
        Self {
            store,
            per_request_cap,
            global_ring,
            requests: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Assigns the next ordinal for `request_id` and appends the event.
    /// Ordinals are gap-free and strictly monotonic per request (§8).
    pub async fn append(
        &self,
        request_id: RequestId,
        trace_id: TraceId,
        principal: PrincipalId,
        producer: &'static str,
        kind: TraceEventKind,
    ) -> TraceEvent {
        let event = {
            let mut requests = self.requests.lock().unwrap();
            let entry = requests.entry(request_id).or_insert_with(|| RequestTrace {
                events: VecDeque::new(),
                next_ordinal: 0,
                compacted: 0,
            });

            let ordinal = entry.next_ordinal;
            entry.next_ordinal += 1;

            let event = TraceEvent {
                request_id,
                trace_id,
                principal,
                ordinal,
                at: OffsetDateTime::now_utc(),
                producer,
                kind,
            };

            entry.events.push_back(event.clone());
            if entry.events.len() > self.per_request_cap {
                entry.events.pop_front();
                entry.compacted += 1;
            }

            let mut recent = self.recent.lock().unwrap();
            if !recent.contains(&request_id) {
                recent.push_back(request_id);
                if recent.len() > self.global_ring {
                    recent.pop_front();
                }
            }

            event
        };

        if let Err(err) = self.store.record_trace_event(&event).await {
            tracing::warn!(event = "trace_spill_failed", request_id = %request_id, error = %err);
        }
        event
    }

    pub fn query(&self, request_id: RequestId) -> Vec<TraceEvent> {
        self.requests
            .lock()
            .unwrap()
            .get(&request_id)
            .map(|entry| entry.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn recent(&self, n: usize) -> Vec<RequestId> {
        let recent = self.recent.lock().unwrap();
        recent.iter().rev().take(n).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigate_storage::InMemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn ordinals_are_gap_free_and_monotonic() {
        let store = TraceStore::new(Arc::new(InMemoryStore::new()));
        let request_id = Uuid::new_v4();
        let trace_id = Uuid::new_v4();
        let principal = "alice".to_string();

        let e0 = store
            .append(request_id, trace_id, principal.clone(), "gateway", TraceEventKind::Accepted {
                api_family: "chat".to_string(),
                declared_model: "gpt-4o-mini".to_string(),
            })
            .await;
        let e1 = store
            .append(request_id, trace_id, principal, "router", TraceEventKind::Routed { candidate_count: 2 })
            .await;

        assert_eq!(e0.ordinal, 0);
        assert_eq!(e1.ordinal, 1);
        let events = store.query(request_id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].ordinal, 1);
    }

    #[tokio::test]
    async fn recent_returns_most_recently_touched_first() {
        let store = TraceStore::new(Arc::new(InMemoryStore::new()));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(a, a, "p".to_string(), "gateway", TraceEventKind::Rejected { reason: "quota".to_string() }).await;
        store.append(b, b, "p".to_string(), "gateway", TraceEventKind::Rejected { reason: "quota".to_string() }).await;

        assert_eq!(store.recent(2), vec![b, a]);
    }
}
