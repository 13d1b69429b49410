use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use aigate_common::RequestId;
use aigate_provider_core::{ChunkEvent, ChunkSink};

const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    id: String,
    sender: mpsc::Sender<ChunkEvent>,
    primary: bool,
    deadline: Duration,
}

/// One request's fan-out point (§4.8): one producer (the adapter, via the
/// Router) and N subscribers, each with its own bounded queue and push
/// deadline. A subscriber that can't keep up is dropped without blocking
/// the producer or other subscribers; the primary client sink is
/// privileged — losing it cancels the producer, since there is no point
/// continuing a stream nobody downstream will see.
pub struct BusTopic {
    subscribers: Mutex<Vec<Subscriber>>,
    cancelled: Arc<AtomicBool>,
    dropped: Mutex<Vec<String>>,
    delivered: AtomicU64,
}

impl BusTopic {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            dropped: Mutex::new(Vec::new()),
            delivered: AtomicU64::new(0),
        }
    }

    /// How many chunks reached at least one subscriber. The Gateway uses
    /// this to tell a stream that failed before any bytes went out
    /// (`failed`) from one that failed partway through (`partial`), since
    /// the Router's own `Attempt` list doesn't track per-chunk delivery on
    /// the failure path.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Registers a subscriber and returns its receiving half. `primary`
    /// marks the client sink; everything else is an observer.
    pub fn subscribe(&self, id: impl Into<String>, primary: bool, deadline: Duration) -> mpsc::Receiver<ChunkEvent> {
        self.subscribe_with_buffer(id, primary, deadline, DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn subscribe_with_buffer(
        &self,
        id: impl Into<String>,
        primary: bool,
        deadline: Duration,
        buffer: usize,
    ) -> mpsc::Receiver<ChunkEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.subscribers.lock().unwrap().push(Subscriber {
            id: id.into(),
            sender: tx,
            primary,
            deadline,
        });
        rx
    }

    /// Drains and returns subscriber ids dropped since the last call, so
    /// the Gateway can emit `subscriber-dropped` TraceEvents for them.
    pub fn take_dropped(&self) -> Vec<String> {
        std::mem::take(&mut self.dropped.lock().unwrap())
    }

    /// True once the primary sink has been dropped and the producer should
    /// be treated as cancelled (`terminal/partial`).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSink for BusTopic {
    async fn push(&self, event: ChunkEvent) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }

        let snapshot: Vec<(String, mpsc::Sender<ChunkEvent>, bool, Duration)> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.id.clone(), s.sender.clone(), s.primary, s.deadline))
            .collect();

        let mut dropped_now = Vec::new();
        let mut sent = 0u64;
        for (id, sender, primary, deadline) in snapshot {
            let delivered = tokio::time::timeout(deadline, sender.send(event.clone())).await;
            if matches!(delivered, Ok(Ok(()))) {
                sent += 1;
            } else {
                dropped_now.push(id);
                if primary {
                    self.cancelled.store(true, Ordering::SeqCst);
                }
            }
        }

        if !dropped_now.is_empty() {
            self.subscribers.lock().unwrap().retain(|s| !dropped_now.contains(&s.id));
            self.dropped.lock().unwrap().extend(dropped_now);
        }

        if sent > 0 {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
        !self.cancelled.load(Ordering::SeqCst)
    }
}

/// Owns one `BusTopic` per in-flight streaming request. Topics are
/// created when a streaming request starts and torn down once its stream
/// ends; nothing here outlives the request it belongs to.
#[derive(Default)]
pub struct StreamingEventBus {
    topics: Mutex<HashMap<RequestId, Arc<BusTopic>>>,
}

impl StreamingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, request_id: RequestId) -> Arc<BusTopic> {
        let topic = Arc::new(BusTopic::new());
        self.topics.lock().unwrap().insert(request_id, topic.clone());
        topic
    }

    pub fn topic(&self, request_id: RequestId) -> Option<Arc<BusTopic>> {
        self.topics.lock().unwrap().get(&request_id).cloned()
    }

    pub fn remove_topic(&self, request_id: RequestId) {
        self.topics.lock().unwrap().remove(&request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn primary_subscriber_receives_chunks_in_order() {
        let topic = BusTopic::new();
        let mut rx = topic.subscribe("client", true, Duration::from_millis(100));

        assert!(topic.push(ChunkEvent::DeltaText("hel".to_string())).await);
        assert!(topic.push(ChunkEvent::DeltaText("lo".to_string())).await);

        match rx.recv().await.unwrap() {
            ChunkEvent::DeltaText(text) => assert_eq!(text, "hel"),
            _ => panic!("wrong event"),
        }
        match rx.recv().await.unwrap() {
            ChunkEvent::DeltaText(text) => assert_eq!(text, "lo"),
            _ => panic!("wrong event"),
        }
    }

    #[tokio::test]
    async fn dropping_primary_receiver_cancels_the_producer() {
        let topic = BusTopic::new();
        let rx = topic.subscribe("client", true, Duration::from_millis(50));
        drop(rx);

        let admitted = topic.push(ChunkEvent::Final).await;
        assert!(!admitted);
        assert!(topic.is_cancelled());
        assert_eq!(topic.take_dropped(), vec!["client".to_string()]);
    }

    #[tokio::test]
    async fn slow_observer_is_dropped_without_blocking_producer() {
        let topic = BusTopic::new();
        let _primary_rx = topic.subscribe("client", true, Duration::from_millis(200));
        let observer_rx = topic.subscribe_with_buffer("observer", false, Duration::from_millis(10), 1);
        drop(observer_rx);

        let admitted = topic.push(ChunkEvent::DeltaText("hi".to_string())).await;
        assert!(admitted, "observer loss must not cancel the producer");
        assert_eq!(topic.take_dropped(), vec!["observer".to_string()]);
    }
}
