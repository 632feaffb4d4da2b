use slicer_types::{SlicerError, SlicerResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded FIFO admission gate in front of the fixed-size slicing worker pool.
///
/// A [`tokio::sync::Semaphore`] permit models one worker slot: acquiring a
/// permit is the dispatch event, and tokio grants queued acquires in FIFO
/// order. `pending` tracks requests that have been admitted to the queue but
/// not yet dispatched, so a non-blocking length check can reject immediately
/// once `max_queue_length` requests are already waiting.
pub struct SliceQueue {
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicU32>,
    workers: u32,
    max_queue_length: u32,
    max_wait: Duration,
}

/// Held for the duration of one dispatched slice job; dropping it frees the
/// worker slot for the next queued request.
pub struct SliceQueuePermit(#[allow(dead_code)] OwnedSemaphorePermit);

impl SliceQueue {
    pub fn new(workers: u32, max_queue_length: u32, max_wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1) as usize)),
            pending: Arc::new(AtomicU32::new(0)),
            workers: workers.max(1),
            max_queue_length,
            max_wait,
        }
    }

    /// Admit one request. Rejects immediately with `QueueFull` if the queue
    /// is already at capacity; otherwise waits up to `max_wait` for a worker
    /// slot, rejecting with `QueueTimeout` if none frees up in time.
    pub async fn admit(&self) -> SlicerResult<SliceQueuePermit> {
        let previous = self.pending.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max_queue_length {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SlicerError::QueueFull);
        }

        let result = tokio::time::timeout(
            self.max_wait,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;
        self.pending.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok(permit)) => Ok(SliceQueuePermit(permit)),
            Ok(Err(_)) => Err(SlicerError::Internal(
                "slice queue semaphore closed unexpectedly".to_string(),
            )),
            Err(_) => Err(SlicerError::QueueTimeout),
        }
    }

    pub fn pending_count(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of worker slots currently dispatched (holding a semaphore
    /// permit), derived from the semaphore's free-permit count rather than
    /// a second counter that could drift out of sync with it.
    pub fn active_workers(&self) -> u32 {
        self.workers
            .saturating_sub(self.semaphore.available_permits() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_worker_count_immediately() {
        let queue = SliceQueue::new(2, 10, Duration::from_millis(100));
        let p1 = queue.admit().await.unwrap();
        let p2 = queue.admit().await.unwrap();
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn active_workers_tracks_held_permits() {
        let queue = SliceQueue::new(2, 10, Duration::from_millis(100));
        assert_eq!(queue.active_workers(), 0);
        let p1 = queue.admit().await.unwrap();
        assert_eq!(queue.active_workers(), 1);
        let p2 = queue.admit().await.unwrap();
        assert_eq!(queue.active_workers(), 2);
        drop(p1);
        assert_eq!(queue.active_workers(), 1);
        drop(p2);
        assert_eq!(queue.active_workers(), 0);
    }

    #[tokio::test]
    async fn rejects_with_queue_full_past_max_length() {
        let queue = Arc::new(SliceQueue::new(1, 1, Duration::from_millis(500)));
        let _held = queue.admit().await.unwrap();

        let queue2 = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { queue2.admit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = queue.admit().await;
        assert!(matches!(result, Err(SlicerError::QueueFull)));

        waiter.abort();
    }

    #[tokio::test]
    async fn times_out_waiting_for_a_free_worker() {
        let queue = SliceQueue::new(1, 5, Duration::from_millis(50));
        let _held = queue.admit().await.unwrap();

        let result = queue.admit().await;
        assert!(matches!(result, Err(SlicerError::QueueTimeout)));
    }
}
