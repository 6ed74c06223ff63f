//! One FIFO-with-priority queue per session, serializing dispatch within a
//! session while letting sessions run fully in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use wopr_core::{InjectId, InjectionSource, Timestamp};
use wopr_events::{EventBus, EventMetadata, WoprEvent};

use crate::dispatch::DispatchOutcome;
use crate::error::{RuntimeError, RuntimeResult};

/// A message waiting to be dispatched, plus the channel its result is
/// delivered on.
struct Slot {
    item: QueuedItem,
    result: oneshot::Sender<RuntimeResult<DispatchOutcome>>,
}

/// The queued item handed to a dispatch worker, stripped of its result
/// channel.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub inject_id: InjectId,
    pub message: String,
    pub source: InjectionSource,
    pub priority: i32,
    pub sequence: u64,
    pub enqueued_at: Timestamp,
}

/// A snapshot of one session queue's load.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub session_key: String,
    pub queue_depth: usize,
    pub is_processing: bool,
}

struct ActiveHandle {
    inject_id: InjectId,
    cancel: CancellationToken,
}

/// One session's ordered work list plus its single in-flight dispatch.
pub struct Queue {
    session: String,
    pending: Mutex<Vec<Slot>>,
    active: Mutex<Option<ActiveHandle>>,
    sequence: AtomicU64,
    idle_since: Mutex<Timestamp>,
    draining: AtomicBool,
    events: Arc<EventBus>,
}

impl Queue {
    fn new(session: impl Into<String>, now: Timestamp, events: Arc<EventBus>) -> Self {
        Self {
            session: session.into(),
            pending: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            sequence: AtomicU64::new(0),
            idle_since: Mutex::new(now),
            draining: AtomicBool::new(false),
            events,
        }
    }

    /// Enqueue a message at the given priority (higher pops first; ties
    /// resolve FIFO by enqueue sequence). Returns the assigned inject-id and
    /// a receiver resolved once the worker finishes (or cancels) this item.
    pub async fn enqueue(
        &self,
        message: impl Into<String>,
        source: InjectionSource,
        priority: i32,
        now: Timestamp,
    ) -> (InjectId, oneshot::Receiver<RuntimeResult<DispatchOutcome>>) {
        let inject_id = InjectId::new(now);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let item = QueuedItem {
            inject_id: inject_id.clone(),
            message: message.into(),
            source,
            priority,
            sequence,
            enqueued_at: now,
        };

        // Insert before the first slot of strictly lower priority so that,
        // within equal priority, earlier-enqueued items (lower `sequence`,
        // already closer to the front) stay ahead of this one.
        let mut pending = self.pending.lock().await;
        let position = pending.iter().position(|slot| slot.item.priority < item.priority).unwrap_or(pending.len());
        pending.insert(position, Slot { item, result: tx });
        drop(pending);

        self.events.publish(WoprEvent::Enqueue {
            metadata: EventMetadata::for_session(self.session.clone()),
            session: self.session.clone(),
            inject_id: inject_id.to_string(),
        });

        (inject_id, rx)
    }

    /// Pop the next item in priority-then-FIFO order and mark it active. A
    /// session never has two active dispatches at once.
    async fn dequeue(&self) -> Option<(QueuedItem, oneshot::Sender<RuntimeResult<DispatchOutcome>>, CancellationToken)> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return None;
        }
        let slot = pending.remove(0);
        drop(pending);

        let cancel = CancellationToken::new();
        *self.active.lock().await =
            Some(ActiveHandle { inject_id: slot.item.inject_id.clone(), cancel: cancel.clone() });

        self.events.publish(WoprEvent::Dequeue {
            metadata: EventMetadata::for_session(self.session.clone()),
            session: self.session.clone(),
            inject_id: slot.item.inject_id.to_string(),
        });

        Some((slot.item, slot.result, cancel))
    }

    /// Signal the active item's cancellation token, if one is in flight.
    pub async fn cancel_active(&self) -> bool {
        if let Some(handle) = self.active.lock().await.as_ref() {
            handle.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Reject every non-active queued item with `Cancelled`, returning how
    /// many were dropped.
    pub async fn cancel_queued(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for slot in pending.drain(..) {
            self.events.publish(WoprEvent::Cancel {
                metadata: EventMetadata::for_session(self.session.clone()),
                session: self.session.clone(),
                inject_id: slot.item.inject_id.to_string(),
            });
            let _ = slot.result.send(Err(RuntimeError::Cancelled));
        }
        count
    }

    /// `cancel_active` and `cancel_queued` together.
    pub async fn cancel_all(&self) -> usize {
        let active = usize::from(self.cancel_active().await);
        active + self.cancel_queued().await
    }

    /// This queue's current load.
    pub async fn stats(&self) -> QueueStats {
        QueueStats {
            session_key: self.session.clone(),
            queue_depth: self.pending.lock().await.len(),
            is_processing: self.active.lock().await.is_some(),
        }
    }

    async fn is_idle(&self) -> bool {
        self.pending.lock().await.is_empty() && self.active.lock().await.is_none()
    }
}

/// Something that can turn a queued item into a finished dispatch. The
/// dispatch engine implements this; the queue only knows how to order and
/// hand off work, never how to execute it.
#[async_trait::async_trait]
pub trait DispatchWorker: Send + Sync {
    /// Run one queued item to completion, observing `cancel` at every
    /// suspension point.
    async fn run(
        &self,
        session: &str,
        item: QueuedItem,
        cancel: CancellationToken,
    ) -> RuntimeResult<DispatchOutcome>;
}

/// Owns every session's queue and the worker loop draining it.
pub struct QueueManager {
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    worker: Arc<dyn DispatchWorker>,
    events: Arc<EventBus>,
}

impl QueueManager {
    /// Build a manager that drains queues through `worker`, publishing
    /// lifecycle events on `events`.
    #[must_use]
    pub fn new(worker: Arc<dyn DispatchWorker>, events: Arc<EventBus>) -> Self {
        Self { queues: RwLock::new(HashMap::new()), worker, events }
    }

    async fn queue_for(&self, session: &str, now: Timestamp) -> Arc<Queue> {
        if let Some(queue) = self.queues.read().await.get(session) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write().await;
        Arc::clone(
            queues
                .entry(session.to_string())
                .or_insert_with(|| Arc::new(Queue::new(session, now, Arc::clone(&self.events)))),
        )
    }

    /// Enqueue a message on `session`'s queue, spawning its worker loop if
    /// this is the first pending item since the worker last went idle.
    pub async fn enqueue(
        &self,
        session: &str,
        message: impl Into<String>,
        source: InjectionSource,
        priority: i32,
        now: Timestamp,
    ) -> (InjectId, oneshot::Receiver<RuntimeResult<DispatchOutcome>>) {
        let queue = self.queue_for(session, now).await;
        let (inject_id, rx) = queue.enqueue(message, source, priority, now).await;
        self.spawn_drain(session.to_string(), Arc::clone(&queue));
        (inject_id, rx)
    }

    /// Spawn the drain loop for `queue` if one isn't already running. Races
    /// between an exiting loop and a fresh `enqueue` are resolved in favor
    /// of spawning an extra (harmless, immediately-exiting) loop rather than
    /// risking a stuck item: `dequeue` is the only place that removes work,
    /// and it's guarded by `pending`'s mutex either way.
    fn spawn_drain(&self, session: String, queue: Arc<Queue>) {
        if queue.draining.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        let worker = Arc::clone(&self.worker);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            loop {
                let Some((item, result, cancel)) = queue.dequeue().await else {
                    queue.draining.store(false, Ordering::Release);
                    break;
                };
                let inject_id = item.inject_id.clone();

                events.publish(WoprEvent::Start {
                    metadata: EventMetadata::for_session(session.clone()),
                    session: session.clone(),
                    inject_id: inject_id.to_string(),
                });

                let outcome = worker.run(&session, item, cancel).await;
                *queue.active.lock().await = None;
                if queue.is_idle().await {
                    *queue.idle_since.lock().await = chrono::Utc::now();
                }
                tracing::debug!(%session, %inject_id, ok = outcome.is_ok(), "dispatch item resolved");

                match &outcome {
                    Ok(_) => {
                        events.publish(WoprEvent::Complete {
                            metadata: EventMetadata::for_session(session.clone()),
                            session: session.clone(),
                            inject_id: inject_id.to_string(),
                        });
                    }
                    Err(RuntimeError::Cancelled) => {
                        events.publish(WoprEvent::Cancel {
                            metadata: EventMetadata::for_session(session.clone()),
                            session: session.clone(),
                            inject_id: inject_id.to_string(),
                        });
                    }
                    Err(err) => {
                        events.publish(WoprEvent::Error {
                            metadata: EventMetadata::for_session(session.clone()),
                            session: session.clone(),
                            inject_id: inject_id.to_string(),
                            reason: err.to_string(),
                        });
                    }
                }

                let _ = result.send(outcome);
            }
        });
    }

    /// Signal cancellation of the active item on `session`'s queue.
    pub async fn cancel_active(&self, session: &str) -> bool {
        match self.queues.read().await.get(session) {
            Some(queue) => queue.cancel_active().await,
            None => false,
        }
    }

    /// Reject every queued (non-active) item on `session`'s queue.
    pub async fn cancel_queued(&self, session: &str) -> usize {
        match self.queues.read().await.get(session) {
            Some(queue) => queue.cancel_queued().await,
            None => 0,
        }
    }

    /// `has_pending` per the spec's manager contract.
    pub async fn has_pending(&self, session: &str) -> bool {
        match self.queues.read().await.get(session) {
            Some(queue) => queue.stats().await.queue_depth > 0,
            None => false,
        }
    }

    /// `is_active` per the spec's manager contract.
    pub async fn is_active(&self, session: &str) -> bool {
        match self.queues.read().await.get(session) {
            Some(queue) => queue.stats().await.is_processing,
            None => false,
        }
    }

    /// Stats for every known session queue.
    pub async fn all_stats(&self) -> Vec<QueueStats> {
        let mut stats = Vec::new();
        for queue in self.queues.read().await.values() {
            stats.push(queue.stats().await);
        }
        stats
    }

    /// Remove queues that are neither active nor have queued items and have
    /// been idle longer than `max_idle_ms`. Idleness is judged against the
    /// queue's own `idle_since` stamp, refreshed whenever it goes empty.
    pub async fn cleanup(&self, max_idle_ms: i64, now: Timestamp) -> usize {
        let candidates: Vec<String> = {
            let mut names = Vec::new();
            for (name, queue) in self.queues.read().await.iter() {
                if queue.is_idle().await {
                    names.push(name.clone());
                }
            }
            names
        };

        let mut removed = 0;
        let mut queues = self.queues.write().await;
        for name in candidates {
            if let Some(queue) = queues.get(&name) {
                if !queue.is_idle().await {
                    continue;
                }
                let idle_since = *queue.idle_since.lock().await;
                if (now - idle_since).num_milliseconds() >= max_idle_ms {
                    queues.remove(&name);
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;
    use wopr_core::{InjectionSource, InjectionType};
    use wopr_llm::{QueryUsage, StopReason};

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    fn source() -> InjectionSource {
        InjectionSource::new(InjectionType::Cli, now())
    }

    struct RecordingWorker {
        order: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl DispatchWorker for RecordingWorker {
        async fn run(
            &self,
            _session: &str,
            item: QueuedItem,
            _cancel: CancellationToken,
        ) -> RuntimeResult<DispatchOutcome> {
            self.order.lock().await.push(item.message.clone());
            Ok(DispatchOutcome {
                inject_id: item.inject_id,
                text: format!("echo: {}", item.message),
                usage: QueryUsage::default(),
                finish_reason: StopReason::EndTurn,
            })
        }
    }

    #[tokio::test]
    async fn fifo_order_within_equal_priority() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let manager = QueueManager::new(Arc::new(RecordingWorker { order: Arc::clone(&order) }), Arc::new(EventBus::new()));

        let (_, first) = manager.enqueue("alpha", "first", source(), 0, now()).await;
        let (_, second) = manager.enqueue("alpha", "second", source(), 0, now()).await;
        let (_, third) = manager.enqueue("alpha", "third", source(), 0, now()).await;

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        third.await.unwrap().unwrap();

        assert_eq!(*order.lock().await, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn higher_priority_item_dequeues_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let manager = QueueManager::new(Arc::new(RecordingWorker { order: Arc::clone(&order) }), Arc::new(EventBus::new()));

        let queue = manager.queue_for("alpha", now()).await;
        let (_, low) = queue.enqueue("low", source(), 0, now()).await;
        let (_, high) = queue.enqueue("high", source(), 10, now()).await;
        manager.spawn_drain("alpha".to_string(), queue);

        high.await.unwrap().unwrap();
        low.await.unwrap().unwrap();
        assert_eq!(*order.lock().await, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn cancel_queued_rejects_pending_items() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        struct SlowWorker;
        #[async_trait::async_trait]
        impl DispatchWorker for SlowWorker {
            async fn run(
                &self,
                _session: &str,
                item: QueuedItem,
                cancel: CancellationToken,
            ) -> RuntimeResult<DispatchOutcome> {
                RUNS.fetch_add(1, AtomicOrdering::SeqCst);
                tokio::select! {
                    () = cancel.cancelled() => Err(RuntimeError::Cancelled),
                    () = tokio::time::sleep(Duration::from_millis(50)) => Ok(DispatchOutcome {
                        inject_id: item.inject_id,
                        text: String::new(),
                        usage: QueryUsage::default(),
                        finish_reason: StopReason::EndTurn,
                    }),
                }
            }
        }

        let manager = QueueManager::new(Arc::new(SlowWorker), Arc::new(EventBus::new()));
        let (_, active) = manager.enqueue("alpha", "active", source(), 0, now()).await;
        let (_, queued) = manager.enqueue("alpha", "queued", source(), 0, now()).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let cancelled = manager.cancel_queued("alpha").await;
        assert_eq!(cancelled, 1);
        assert!(queued.await.unwrap().is_err());
        active.await.unwrap().unwrap();
        assert_eq!(RUNS.load(AtomicOrdering::SeqCst), 1);
    }
}
