//! Bounded multi-producer, multi-consumer ingestion queue.
//!
//! Events enter through a [`QueueSender`] and leave through any clone of the
//! [`QueueReceiver`]. Both halves are cheap to clone.
//!
//! # Ordering
//!
//! The queue is FIFO, but consumers are not coordinated: whichever worker is
//! idle takes the next event. Two events of the same agent and discovery type
//! enqueued as A then B may therefore be *applied* as B then A when they land
//! on different workers. The cursor policy of the projectors decides what
//! happens to the late one.
//!
//! # Backpressure
//!
//! [`QueueSender::enqueue`] waits while the queue is full. Nothing is dropped.
//!
//! # Closing
//!
//! The queue closes when every sender is dropped. Receivers keep returning
//! queued events until it is drained, then `None`.

use crate::PipelineError;
use crate::metrics::PipelineMetrics;
use discovery_core::DiscoveryEvent;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Create a queue holding at most `capacity` events.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] when `capacity` is zero.
pub fn bounded(capacity: usize) -> Result<(QueueSender, QueueReceiver), PipelineError> {
    if capacity == 0 {
        return Err(PipelineError::InvalidConfig(
            "queue capacity must be greater than zero".to_string(),
        ));
    }

    let (tx, rx) = mpsc::channel(capacity);
    Ok((
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    ))
}

/// Producer half of the queue.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<DiscoveryEvent>,
}

impl QueueSender {
    /// Add `event`, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] when every receiver is gone.
    pub async fn enqueue(&self, event: DiscoveryEvent) -> Result<(), PipelineError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PipelineError::QueueClosed)?;
        PipelineMetrics::record_enqueued(self.len());
        Ok(())
    }

    /// Maximum number of queued events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Events currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether no event is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half of the queue, shared by every worker.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<DiscoveryEvent>>>,
}

impl QueueReceiver {
    /// Take the next event, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained. Cancel safe.
    pub async fn dequeue(&self) -> Option<DiscoveryEvent> {
        let mut rx = self.rx.lock().await;
        let event = rx.recv().await?;
        PipelineMetrics::record_queue_depth(rx.len());
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_testing::discovery_event;
    use serde_json::json;
    use std::time::Duration;

    fn event(id: i64) -> DiscoveryEvent {
        discovery_event(id, "A", "cloud", json!({"provider": "azure"}))
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(bounded(0), Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn events_come_out_in_fifo_order() {
        let (tx, rx) = bounded(4).unwrap();
        for id in 1..=3 {
            tx.enqueue(event(id)).await.unwrap();
        }
        assert_eq!(tx.len(), 3);

        let ids: Vec<i64> = [
            rx.dequeue().await.unwrap().id,
            rx.dequeue().await.unwrap().id,
            rx.dequeue().await.unwrap().id,
        ]
        .to_vec();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn full_queue_blocks_the_producer() {
        let (tx, rx) = bounded(1).unwrap();
        tx.enqueue(event(1)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.enqueue(event(2))).await;
        assert!(blocked.is_err(), "enqueue should wait while the queue is full");

        assert_eq!(rx.dequeue().await.unwrap().id, 1);
        tokio::time::timeout(Duration::from_secs(1), tx.enqueue(event(3)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.dequeue().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let (tx, rx) = bounded(2).unwrap();
        tx.enqueue(event(1)).await.unwrap();
        drop(tx);

        assert_eq!(rx.dequeue().await.unwrap().id, 1);
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_fails_without_receivers() {
        let (tx, rx) = bounded(2).unwrap();
        drop(rx);
        assert!(matches!(
            tx.enqueue(event(1)).await,
            Err(PipelineError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn receivers_share_one_queue() {
        let (tx, rx) = bounded(4).unwrap();
        let other = rx.clone();
        tx.enqueue(event(1)).await.unwrap();
        tx.enqueue(event(2)).await.unwrap();

        assert_eq!(other.dequeue().await.unwrap().id, 1);
        assert_eq!(rx.dequeue().await.unwrap().id, 2);
    }
}
