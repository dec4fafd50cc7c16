/// Background persistence worker for ground items.
///
/// Mutations to a map's ground items must never wait on storage. The map
/// manager clones the affected map's items while it still holds the map lock
/// and pushes them onto a bounded `tokio::sync::mpsc` queue through a
/// [`SaveQueue`]. One worker task drains the queue in FIFO order and writes
/// each snapshot through the configured [`GroundItemRepository`].
///
/// # Back-pressure
///
/// [`SaveQueue::enqueue_ground_items`] never blocks. When the queue is full
/// the job is dropped with a warning; every snapshot is a complete copy of
/// the map, so the next mutation's job supersedes it.
///
/// # Failures
///
/// Each backend call is bounded by a timeout. Failed and timed-out saves are
/// logged at error level and counted; the in-memory state stays
/// authoritative and nothing is rolled back.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::ground_items::GroundItemSnapshot;
use crate::repository::GroundItemRepository;

/// A unit of work for the saver task.
pub enum SaveJob {
    /// Replace the stored ground items of one map.
    GroundItems {
        map_id: u16,
        snapshot: GroundItemSnapshot,
    },
    /// Ack once every job queued before this one has been processed.
    Flush(oneshot::Sender<()>),
    /// Stop the worker after the jobs queued before this one.
    Shutdown,
}

/// Counters shared between the queue handles and the worker.
#[derive(Debug, Default)]
struct SaverStats {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the saver counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaverCounters {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Cheap, cloneable producer handle.
#[derive(Clone)]
pub struct SaveQueue {
    tx: mpsc::Sender<SaveJob>,
    stats: Arc<SaverStats>,
}

impl SaveQueue {
    /// Queue a snapshot of `map_id` without waiting.
    ///
    /// # Returns
    ///
    /// * `true` if the job was queued.
    /// * `false` if the queue was full or the worker has stopped.
    pub fn enqueue_ground_items(&self, map_id: u16, snapshot: GroundItemSnapshot) -> bool {
        match self.tx.try_send(SaveJob::GroundItems { map_id, snapshot }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Save queue full; dropped ground item save for map {map_id}");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!("Background saver stopped; ground items of map {map_id} not saved");
                false
            }
        }
    }

    pub fn counters(&self) -> SaverCounters {
        SaverCounters {
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Owner handle for the saver task.
///
/// Returned by [`spawn`]. Hand out producers with [`BackgroundSaver::queue`]
/// and call [`BackgroundSaver::shutdown`] on the way out.
pub struct BackgroundSaver {
    queue: SaveQueue,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSaver {
    pub fn queue(&self) -> SaveQueue {
        self.queue.clone()
    }

    pub fn counters(&self) -> SaverCounters {
        self.queue.counters()
    }

    pub fn failed_saves(&self) -> u64 {
        self.queue.counters().failed
    }

    /// Wait until every job queued so far has been processed.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once the worker acknowledges.
    /// * `Err` if the worker has already exited.
    pub async fn flush(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.queue
            .tx
            .send(SaveJob::Flush(ack_tx))
            .await
            .map_err(|_| "Background saver flush: channel closed".to_string())?;
        ack_rx
            .await
            .map_err(|_| "Background saver flush: worker dropped the ack".to_string())
    }

    /// Ask the worker to finish the queued jobs and stop, then wait for it.
    ///
    /// Calling it twice is harmless.
    pub async fn shutdown(&mut self) {
        let _ = self.queue.tx.send(SaveJob::Shutdown).await;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("Background saver task failed: {e}");
            }
        }
    }
}

/// Spawn the saver task on the current tokio runtime.
///
/// # Arguments
///
/// * `repository` - Where snapshots are written.
/// * `capacity` - Queue length before jobs are dropped (at least 1).
/// * `timeout` - Upper bound for one backend call.
pub fn spawn(
    repository: Arc<dyn GroundItemRepository>,
    capacity: usize,
    timeout: Duration,
) -> BackgroundSaver {
    let (tx, rx) = mpsc::channel::<SaveJob>(capacity.max(1));
    let stats = Arc::new(SaverStats::default());
    let handle = tokio::spawn(saver_main(rx, repository, timeout, Arc::clone(&stats)));

    BackgroundSaver {
        queue: SaveQueue { tx, stats },
        handle: Some(handle),
    }
}

// ---------------------------------------------------------------------------
//  Worker loop
// ---------------------------------------------------------------------------

async fn saver_main(
    mut rx: mpsc::Receiver<SaveJob>,
    repository: Arc<dyn GroundItemRepository>,
    timeout: Duration,
    stats: Arc<SaverStats>,
) {
    log::info!("Background saver started.");

    while let Some(job) = rx.recv().await {
        match job {
            SaveJob::GroundItems { map_id, snapshot } => {
                let started = Instant::now();
                let result =
                    tokio::time::timeout(timeout, repository.save_ground_items(map_id, &snapshot))
                        .await;
                match result {
                    Ok(Ok(())) => {
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                        log::debug!(
                            "Saved {} ground tiles of map {map_id} in {:.2?}",
                            snapshot.len(),
                            started.elapsed()
                        );
                    }
                    Ok(Err(e)) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Ground item save for map {map_id} failed: {e}");
                    }
                    Err(_) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Ground item save for map {map_id} timed out after {timeout:?}");
                    }
                }
            }
            SaveJob::Flush(ack) => {
                // Earlier jobs are done: the channel is FIFO.
                let _ = ack.send(());
            }
            SaveJob::Shutdown => {
                log::info!("Background saver: shutdown requested.");
                break;
            }
        }
    }

    log::info!("Background saver exiting.");
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------
