//! Indexing Queue (C5): a bounded worker pool draining a priority queue of
//! pending indexing work, deduplicated against in-flight items.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;

/// Lower values run first; ties break FIFO on enqueue order.
pub type Priority = u8;

/// Default priority for directory-scan-discovered work.
pub const PRIORITY_SCAN: Priority = 10;
/// Default priority for change-watcher-discovered work, which runs ahead of
/// a bulk scan since it reflects a user's live edit.
pub const PRIORITY_WATCH: Priority = 0;

struct QueueItem {
    priority: Priority,
    sequence: u64,
    directory_id: i64,
    directory_path: PathBuf,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse priority so lower runs first,
        // and reverse sequence so earlier enqueues win ties.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type Handler =
    Arc<dyn Fn(i64, PathBuf) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// A bounded pool of workers draining a shared priority queue of pending
/// directories, each invoking a full directory-indexing pass (C6) rather
/// than one image at a time, so a batch's embeddings reach the index in one
/// write.
///
/// Enqueueing a directory already in flight is a no-op: the in-flight set is
/// the queue's dedup key, not just a diagnostic, so a burst of
/// change-watcher events for the same directory collapses into a single
/// indexing pass.
pub struct IndexingQueue {
    heap: Mutex<BinaryHeap<QueueItem>>,
    inflight: DashSet<i64>,
    notify: Notify,
    sequence: AtomicU64,
    shutdown: Arc<tokio::sync::Notify>,
}

impl std::fmt::Debug for IndexingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingQueue")
            .field("pending", &self.heap.lock().len())
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

impl IndexingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            inflight: DashSet::new(),
            notify: Notify::new(),
            sequence: AtomicU64::new(0),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        })
    }

    /// Enqueues `directory_id` at `priority` unless it is already pending or
    /// being processed. Returns whether it was newly enqueued.
    pub fn enqueue(&self, directory_id: i64, directory_path: PathBuf, priority: Priority) -> bool {
        if !self.inflight.insert(directory_id) {
            return false;
        }
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(QueueItem {
            priority,
            sequence,
            directory_id,
            directory_path,
        });
        self.notify.notify_one();
        true
    }

    /// Number of items pending or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether the queue holds no pending or in-flight items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns `worker_count` tokio tasks, each pulling items from the queue
    /// and running `handler` against them until [`IndexingQueue::shutdown`]
    /// is called.
    pub fn spawn_workers(self: &Arc<Self>, worker_count: usize, handler: Handler) {
        for _ in 0..worker_count {
            let queue = Arc::clone(self);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                queue.run_worker(handler).await;
            });
        }
    }

    async fn run_worker(self: &Arc<Self>, handler: Handler) {
        loop {
            let next = self.heap.lock().pop();
            let Some(item) = next else {
                tokio::select! {
                    () = self.notify.notified() => continue,
                    () = self.shutdown.notified() => return,
                }
            };

            if let Err(error) = handler(item.directory_id, item.directory_path.clone()).await {
                tracing::warn!(
                    directory_id = item.directory_id,
                    path = %item.directory_path.display(),
                    %error,
                    "indexing work item failed"
                );
            }
            self.inflight.remove(&item.directory_id);
        }
    }

    /// Wakes every worker so it observes shutdown and exits its loop.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AO};
    use std::time::Duration;

    #[test]
    fn duplicate_enqueue_is_rejected_while_inflight() {
        let queue = IndexingQueue::new();
        assert!(queue.enqueue(1, PathBuf::from("a"), PRIORITY_SCAN));
        assert!(!queue.enqueue(1, PathBuf::from("a"), PRIORITY_SCAN));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn lower_priority_pops_first() {
        let queue = IndexingQueue::new();
        queue.enqueue(1, PathBuf::from("scan"), PRIORITY_SCAN);
        queue.enqueue(2, PathBuf::from("watch"), PRIORITY_WATCH);

        let first = queue.heap.lock().pop().unwrap();
        assert_eq!(first.directory_id, 2);
    }

    #[tokio::test]
    async fn workers_drain_the_queue() {
        let queue = IndexingQueue::new();
        let processed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&processed);
        let handler: Handler = Arc::new(move |_directory_id, _path| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, AO::Relaxed);
                Ok(())
            })
        });

        queue.spawn_workers(2, handler);
        queue.enqueue(1, PathBuf::from("a"), PRIORITY_SCAN);
        queue.enqueue(2, PathBuf::from("b"), PRIORITY_SCAN);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processed.load(AO::Relaxed), 2);
        assert!(queue.is_empty());
        queue.shutdown();
    }
}
