//! The streaming inference coordinator.
//!
//! Instead of a shared FIFO guarded by one global lock, every client owns a
//! single-slot mailbox holding its freshest processed payload. Submitting
//! overwrites whatever the workers have not serviced yet, so bursts degrade
//! to "latest wins" per client: staleness dropping is structural, not a
//! queue-scan. A small pool of worker tasks drains the mailboxes; with the
//! default of one worker, at most one classifier invocation is in flight at
//! any instant. A per-client service guard keeps one client's mailbox on one
//! worker at a time, so responses to a client are delivered in submission
//! order even with multiple workers.
//!
//! Classifier calls run on the blocking thread pool, never on the event
//! loop. A scoring failure becomes an error envelope; a send to a departed
//! connection is logged and swallowed. Neither terminates a worker or
//! affects other clients.

use crate::classifier::Classifier;
use crate::stream::protocol::Envelope;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A processed feature payload awaiting classification.
#[derive(Debug, Clone)]
pub struct ScorePayload {
    /// Timestamp carried over from the raw frames.
    pub timestamp: f64,
    /// Right-hand feature vector.
    pub right: Vec<f64>,
    /// Left-hand feature vector for dual-hand sessions.
    pub left: Option<Vec<f64>>,
}

struct ClientHandle {
    /// Freshest unserviced payload. Overwritten on submit, emptied by the
    /// worker that services it.
    slot: Mutex<Option<ScorePayload>>,
    /// Whether a wake-up for this client is already pending.
    queued: AtomicBool,
    /// Whether a worker currently holds this client's mailbox.
    servicing: AtomicBool,
    outbound: mpsc::Sender<Envelope>,
    connected_at: DateTime<Utc>,
}

/// Coordinates mailboxes, workers, and response dispatch.
pub struct Coordinator {
    clients: Mutex<HashMap<Uuid, Arc<ClientHandle>>>,
    classifier: Arc<dyn Classifier>,
    notify_tx: mpsc::Sender<Uuid>,
    notify_rx: tokio::sync::Mutex<mpsc::Receiver<Uuid>>,
    workers: usize,
}

impl Coordinator {
    /// Create a coordinator over the given classifier.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        workers: usize,
        notify_capacity: usize,
    ) -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::channel(notify_capacity);
        Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            classifier,
            notify_tx,
            notify_rx: tokio::sync::Mutex::new(notify_rx),
            workers,
        })
    }

    /// Spawn the inference worker tasks.
    pub fn spawn_workers(self: &Arc<Self>) {
        for worker in 0..self.workers {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                tracing::debug!(worker, "inference worker started");
                while let Some(client_id) = coordinator.next_ready().await {
                    coordinator.service(client_id).await;
                }
                tracing::debug!(worker, "inference worker stopped");
            });
        }
    }

    /// Register a connection with its outbound envelope channel.
    pub fn register(&self, client_id: Uuid, outbound: mpsc::Sender<Envelope>) {
        let handle = Arc::new(ClientHandle {
            slot: Mutex::new(None),
            queued: AtomicBool::new(false),
            servicing: AtomicBool::new(false),
            outbound,
            connected_at: Utc::now(),
        });
        if let Ok(mut clients) = self.clients.lock() {
            clients.insert(client_id, handle);
        }
        tracing::info!(%client_id, "client connected");
    }

    /// Remove a connection. Its mailbox and rate-limiter state drop with the
    /// connection; an occupied slot is simply never serviced.
    pub fn deregister(&self, client_id: Uuid) {
        let removed = self
            .clients
            .lock()
            .ok()
            .and_then(|mut clients| clients.remove(&client_id));
        if let Some(handle) = removed {
            let connected_for = Utc::now() - handle.connected_at;
            tracing::info!(%client_id, ?connected_for, "client disconnected");
        }
    }

    /// Store `payload` as the client's freshest and wake a worker.
    ///
    /// Overwriting an unserviced payload is the staleness drop: the older
    /// payload disappears without side effects or a response.
    pub async fn submit(&self, client_id: Uuid, payload: ScorePayload) {
        let Some(handle) = self.lookup(client_id) else {
            tracing::debug!(%client_id, "submit after disconnect, dropped");
            return;
        };
        if let Ok(mut slot) = handle.slot.lock() {
            if slot.replace(payload).is_some() {
                tracing::trace!(%client_id, "stale payload overwritten");
            }
        }
        if !handle.queued.swap(true, Ordering::AcqRel) && self.notify_tx.try_send(client_id).is_err()
        {
            // Wake channel full. The payload stays in the slot and the next
            // accepted frame re-notifies.
            handle.queued.store(false, Ordering::Release);
            tracing::warn!(%client_id, "worker wake channel full");
        }
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn lookup(&self, client_id: Uuid) -> Option<Arc<ClientHandle>> {
        self.clients
            .lock()
            .ok()
            .and_then(|clients| clients.get(&client_id).cloned())
    }

    /// Await the next client with a pending payload.
    pub(crate) async fn next_ready(&self) -> Option<Uuid> {
        self.notify_rx.lock().await.recv().await
    }

    /// Service one client's mailbox: take the freshest payload, score it on
    /// the blocking pool, dispatch the envelope.
    ///
    /// The service guard admits one worker per client at a time; the worker
    /// holding the guard drains the slot before releasing it, including
    /// payloads submitted while it was scoring. Responses to a client are
    /// therefore delivered in submission order regardless of pool size.
    pub(crate) async fn service(&self, client_id: Uuid) {
        let Some(handle) = self.lookup(client_id) else {
            // Disconnected after enqueueing; nothing to do.
            return;
        };
        if handle.servicing.swap(true, Ordering::AcqRel) {
            // Another worker holds this client and will drain the slot.
            return;
        }
        loop {
            // Clear the pending flag before taking the slot so a submit that
            // races with scoring re-notifies.
            handle.queued.store(false, Ordering::Release);
            let payload = handle.slot.lock().ok().and_then(|mut slot| slot.take());
            if let Some(payload) = payload {
                let envelope = self.score(payload).await;
                if handle.outbound.send(envelope).await.is_err() {
                    tracing::debug!(%client_id, "response dropped, connection closed");
                }
                continue;
            }
            handle.servicing.store(false, Ordering::Release);
            // A submit can land between the empty take and the release above,
            // and its wake-up may reach a worker that saw the guard still
            // held. Reclaim the guard if the slot refilled.
            let refilled = handle
                .slot
                .lock()
                .map(|slot| slot.is_some())
                .unwrap_or(false);
            if !refilled || handle.servicing.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    async fn score(&self, payload: ScorePayload) -> Envelope {
        let classifier = Arc::clone(&self.classifier);
        let timestamp = payload.timestamp;
        let result = tokio::task::spawn_blocking(move || {
            let right = classifier.score(&payload.right)?;
            let left = payload
                .left
                .as_deref()
                .map(|features| classifier.score(features))
                .transpose()?;
            Ok::<_, crate::error::GloveError>((left, right))
        })
        .await;

        match result {
            Ok(Ok((Some(left), right))) => Envelope::dual(timestamp, left, right),
            Ok(Ok((None, right))) => Envelope::single(timestamp, right),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "classifier failure");
                Envelope::error(e.to_string())
            }
            Err(e) => {
                tracing::error!(error = %e, "classifier task panicked");
                Envelope::error("internal classifier failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{MockClassifier, Prediction};
    use crate::error::{AppResult, GloveError};

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn score(&self, _features: &[f64]) -> AppResult<Prediction> {
            Err(GloveError::Classifier("tensor shape mismatch".to_string()))
        }
    }

    /// Slow enough that a second submit can land mid-score.
    struct SlowClassifier;

    impl Classifier for SlowClassifier {
        fn score(&self, features: &[f64]) -> AppResult<Prediction> {
            std::thread::sleep(std::time::Duration::from_millis(150));
            Ok(Prediction {
                label: "Rest".to_string(),
                confidence: features[0].clamp(0.0, 1.0),
            })
        }
    }

    fn payload(ts: f64) -> ScorePayload {
        ScorePayload {
            timestamp: ts,
            right: vec![0.5; 11],
            left: None,
        }
    }

    fn coordinator() -> Arc<Coordinator> {
        Coordinator::new(Arc::new(MockClassifier::default()), 1, 16)
    }

    #[tokio::test]
    async fn scores_submitted_payload() {
        let coord = coordinator();
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        coord.submit(id, payload(1.0)).await;
        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;

        match rx.recv().await.unwrap() {
            Envelope::Single {
                timestamp,
                prediction,
                confidence,
            } => {
                assert_eq!(timestamp, 1.0);
                assert!(!prediction.is_empty());
                assert!((0.0..=1.0).contains(&confidence));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn burst_keeps_only_freshest_payload() {
        let coord = coordinator();
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        // Three submissions before any worker runs: the slot holds only the
        // last, and only one wake-up is pending.
        coord.submit(id, payload(1.0)).await;
        coord.submit(id, payload(2.0)).await;
        coord.submit(id, payload(3.0)).await;

        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;

        match rx.recv().await.unwrap() {
            Envelope::Single { timestamp, .. } => assert_eq!(timestamp, 3.0),
            other => panic!("unexpected envelope: {other:?}"),
        }
        // No further envelopes: earlier payloads were dropped without
        // side effects.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_purges_pending_work() {
        let coord = coordinator();
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        coord.submit(id, payload(1.0)).await;
        coord.deregister(id);
        assert_eq!(coord.client_count(), 0);

        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn submit_after_disconnect_is_dropped() {
        let coord = coordinator();
        let id = Uuid::new_v4();
        // Never registered; must not panic or enqueue.
        coord.submit(id, payload(1.0)).await;
        assert_eq!(coord.client_count(), 0);
    }

    #[tokio::test]
    async fn classifier_failure_becomes_error_envelope() {
        let coord = Coordinator::new(Arc::new(FailingClassifier), 1, 16);
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        coord.submit(id, payload(1.0)).await;
        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;

        match rx.recv().await.unwrap() {
            Envelope::Error { error } => assert!(error.contains("tensor shape")),
            other => panic!("unexpected envelope: {other:?}"),
        }

        // The worker path stays usable after a failure.
        coord.submit(id, payload(2.0)).await;
        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            Envelope::Error { .. }
        ));
    }

    #[tokio::test]
    async fn dual_payload_yields_dual_envelope() {
        let coord = coordinator();
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        let dual = ScorePayload {
            timestamp: 4.0,
            right: vec![0.5; 11],
            left: Some(vec![0.2; 11]),
        };
        coord.submit(id, dual).await;
        let ready = coord.next_ready().await.unwrap();
        coord.service(ready).await;

        match rx.recv().await.unwrap() {
            Envelope::Dual {
                timestamp,
                left_prediction,
                right_prediction,
                ..
            } => {
                assert_eq!(timestamp, 4.0);
                assert!(!left_prediction.is_empty());
                assert!(!right_prediction.is_empty());
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_wakeups_deliver_in_submission_order() {
        let coord = Coordinator::new(Arc::new(SlowClassifier), 2, 16);
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        // First payload starts scoring on one worker.
        coord.submit(id, payload(1.0)).await;
        let first = coord.next_ready().await.unwrap();
        let active = tokio::spawn({
            let coord = Arc::clone(&coord);
            async move { coord.service(first).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        // Second payload lands while the first is mid-score. The wake-up it
        // produces must not let another worker overtake the active one.
        coord.submit(id, payload(2.0)).await;
        let second = coord.next_ready().await.unwrap();
        coord.service(second).await;
        active.await.unwrap();

        match rx.recv().await.unwrap() {
            Envelope::Single { timestamp, .. } => assert_eq!(timestamp, 1.0),
            other => panic!("unexpected envelope: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Envelope::Single { timestamp, .. } => assert_eq!(timestamp, 2.0),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_outbound_channel_is_swallowed() {
        let coord = coordinator();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let id = Uuid::new_v4();
        coord.register(id, tx);

        coord.submit(id, payload(1.0)).await;
        let ready = coord.next_ready().await.unwrap();
        // Must not panic even though the receiver is gone.
        coord.service(ready).await;
    }
}
