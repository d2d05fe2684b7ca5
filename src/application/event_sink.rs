//! Event Sink Adapter (C11): batches, dedups, and flushes events without
//! ever blocking the Cycle Controller's own persistence of `CycleState`. A
//! batching adapter in front of a dumb `write_batch` sink, with an optional
//! notifier for critical events.

use crate::domain::errors::PersistenceError;
use crate::domain::events::{Event, Severity};
use crate::domain::ports::{EventSink, Notifier};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// The durable append-only sink (`bot_events` table, or any other backend);
/// deliberately ignorant of batching/dedup policy.
#[async_trait]
pub trait EventSinkBackend: Send + Sync {
    async fn write_batch(&self, events: &[Event]) -> Result<(), PersistenceError>;
}

pub struct BatchingConfig {
    pub batch_size: usize,
    pub batch_age: Duration,
    pub dedup_window: Duration,
    pub overflow_cap: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_age: Duration::seconds(10),
            dedup_window: Duration::seconds(30),
            overflow_cap: 500,
        }
    }
}

struct Inner {
    batch: Vec<Event>,
    batch_started_at: Option<chrono::DateTime<chrono::Utc>>,
    dedup_seen: HashMap<String, chrono::DateTime<chrono::Utc>>,
    overflow: VecDeque<Event>,
}

pub struct BatchingEventSink {
    backend: Arc<dyn EventSinkBackend>,
    notifier: Option<Arc<dyn Notifier>>,
    config: BatchingConfig,
    inner: Mutex<Inner>,
}

impl BatchingEventSink {
    pub fn new(
        backend: Arc<dyn EventSinkBackend>,
        notifier: Option<Arc<dyn Notifier>>,
        config: BatchingConfig,
    ) -> Self {
        Self {
            backend,
            notifier,
            config,
            inner: Mutex::new(Inner {
                batch: Vec::new(),
                batch_started_at: None,
                dedup_seen: HashMap::new(),
                overflow: VecDeque::new(),
            }),
        }
    }

    fn prune_dedup(inner: &mut Inner, now: chrono::DateTime<chrono::Utc>, window: Duration) {
        inner.dedup_seen.retain(|_, seen_at| now - *seen_at <= window);
    }

    /// Flushes the overflow queue (if the backend is healthy again) and then
    /// the current batch. Both paths share the same retained-on-failure
    /// eviction policy: oldest dropped first once `overflow_cap` is hit.
    async fn flush_locked(&self, inner: &mut Inner) {
        if !inner.overflow.is_empty() {
            let pending: Vec<Event> = inner.overflow.iter().cloned().collect();
            if self.backend.write_batch(&pending).await.is_ok() {
                inner.overflow.clear();
            }
        }

        if inner.batch.is_empty() {
            return;
        }

        match self.backend.write_batch(&inner.batch).await {
            Ok(()) => {
                inner.batch.clear();
                inner.batch_started_at = None;
            }
            Err(err) => {
                warn!(error = %err, "event sink flush failed, queuing to overflow");
                for event in inner.batch.drain(..) {
                    if inner.overflow.len() >= self.config.overflow_cap {
                        inner.overflow.pop_front();
                    }
                    inner.overflow.push_back(event);
                }
                inner.batch_started_at = None;
            }
        }
    }

    pub async fn flush(&self) {
        let mut inner = self.inner.lock().await;
        self.flush_locked(&mut inner).await;
    }
}

#[async_trait]
impl EventSink for BatchingEventSink {
    async fn publish(&self, event: Event) -> Result<(), PersistenceError> {
        if event.is_critical() {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&format!("{:?}", event.event_type), &event.message).await;
            }
            return self.backend.write_batch(std::slice::from_ref(&event)).await;
        }

        let mut inner = self.inner.lock().await;
        let now = event.occurred_at;
        Self::prune_dedup(&mut inner, now, self.config.dedup_window);

        let key = event.dedup_key(&["client_order_id", "cycle_id"]);
        if inner.dedup_seen.contains_key(&key) {
            return Ok(());
        }
        inner.dedup_seen.insert(key, now);

        if matches!(event.severity, Severity::Warning | Severity::Error) {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&format!("{:?}", event.event_type), &event.message).await;
            }
        }

        if inner.batch_started_at.is_none() {
            inner.batch_started_at = Some(now);
        }
        inner.batch.push(event);

        let age_exceeded = inner
            .batch_started_at
            .map(|started| now - started >= self.config.batch_age)
            .unwrap_or(false);
        if inner.batch.len() >= self.config.batch_size || age_exceeded {
            self.flush_locked(&mut inner).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        writes: AtomicUsize,
        events_seen: AtomicUsize,
        fail_next: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl EventSinkBackend for CountingBackend {
        async fn write_batch(&self, events: &[Event]) -> Result<(), PersistenceError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PersistenceError::Io("simulated failure".to_string()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.events_seen.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn sink(batch_size: usize) -> (Arc<CountingBackend>, BatchingEventSink) {
        let backend = Arc::new(CountingBackend {
            writes: AtomicUsize::new(0),
            events_seen: AtomicUsize::new(0),
            fail_next: std::sync::atomic::AtomicBool::new(false),
        });
        let cfg = BatchingConfig {
            batch_size,
            batch_age: Duration::hours(1),
            dedup_window: Duration::seconds(30),
            overflow_cap: 10,
        };
        let adapter = BatchingEventSink::new(backend.clone(), None, cfg);
        (backend, adapter)
    }

    #[tokio::test]
    async fn batches_until_size_reached() {
        let (backend, adapter) = sink(3);
        adapter
            .publish(Event::new(EventType::TradeExecuted, Severity::Info, "a"))
            .await
            .unwrap();
        adapter
            .publish(Event::new(EventType::CycleComplete, Severity::Info, "b"))
            .await
            .unwrap();
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
        adapter
            .publish(Event::new(EventType::Pause, Severity::Info, "c"))
            .await
            .unwrap();
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(backend.events_seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn critical_events_bypass_batching() {
        let (backend, adapter) = sink(100);
        adapter
            .publish(Event::new(EventType::DriftHalt, Severity::Critical, "halt"))
            .await
            .unwrap();
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_within_window_is_deduped() {
        let (backend, adapter) = sink(1);
        let e1 = Event::new(EventType::TradeFailed, Severity::Warning, "dup")
            .with_metadata(serde_json::json!({"cycle_id": "abc"}));
        let e2 = Event::new(EventType::TradeFailed, Severity::Warning, "dup")
            .with_metadata(serde_json::json!({"cycle_id": "abc"}));
        adapter.publish(e1).await.unwrap();
        adapter.publish(e2).await.unwrap();
        // Only the first publish should have made it into a flushed batch;
        // the dup never joins a batch so nothing forces a flush.
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(backend.events_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_flush_queues_to_overflow_and_retries_later() {
        let (backend, adapter) = sink(1);
        backend.fail_next.store(true, Ordering::SeqCst);
        adapter
            .publish(Event::new(EventType::Start, Severity::Info, "s"))
            .await
            .unwrap();
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);

        adapter
            .publish(Event::new(EventType::Stop, Severity::Info, "t"))
            .await
            .unwrap();
        // Second publish flushes the overflow queue (1 event) plus its own
        // new batch (1 event) as two successful write_batch calls.
        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
        assert_eq!(backend.events_seen.load(Ordering::SeqCst), 2);
    }
}
