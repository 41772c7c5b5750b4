//! Replay concurrency engine.
//!
//! One process-wide bounded queue of remote updates, across all replicated
//! domains, drained by a fixed-size worker pool. The shared-receiver lock
//! makes "dequeue one item + mark it active in its domain" atomic with
//! respect to pool resizing; the replay itself runs outside the lock so
//! independent changes proceed fully in parallel.
//!
//! Shutdown is cooperative: each poll uses a short bounded wait, and the
//! shutdown flag is re-checked between polls. A worker never dies on a bad
//! message — per-change failures are logged inside the domain replay and
//! the worker keeps polling.

use std::sync::Arc;
use std::time::Duration;

use castor_core::config::ReplicationConfig;
use castor_core::errors::{ReplayError, ReplicationResult};
use castor_core::message::UpdateMessage;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::ReplicationDomain;

/// One queued unit of work: a remote update and the domain that owns it.
pub struct UpdateToReplay {
    pub msg: UpdateMessage,
    pub domain: Arc<ReplicationDomain>,
}

struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

/// The shared queue plus its resizeable worker set.
pub struct ReplayEngine {
    tx: mpsc::Sender<UpdateToReplay>,
    rx: Arc<Mutex<mpsc::Receiver<UpdateToReplay>>>,
    poll_timeout: Duration,
    default_workers: usize,
    pool: Mutex<WorkerPool>,
}

impl ReplayEngine {
    /// Create the engine. No workers run until [`ReplayEngine::start`].
    pub fn new(config: &ReplicationConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.replay_queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            poll_timeout: config.replay_poll_timeout(),
            default_workers: config.replay_threads.max(1),
            pool: Mutex::new(WorkerPool {
                workers: Vec::new(),
                shutdown,
            }),
        }
    }

    /// Spawn the configured number of workers.
    pub async fn start(&self) {
        self.resize(self.default_workers).await;
    }

    /// Queue a remote update for replay. Blocks when the queue is full
    /// (backpressure towards the receiving connection).
    pub async fn publish(&self, update: UpdateToReplay) -> ReplicationResult<()> {
        debug!(csn = %update.msg.csn(), kind = update.msg.kind(), "queueing update for replay");
        self.tx
            .send(update)
            .await
            .map_err(|_| ReplayError::QueueClosed.into())
    }

    /// Change the worker count: quiesce every worker, drain the in-flight
    /// dequeues, then restart with the new count. Queued updates survive.
    pub async fn resize(&self, count: usize) {
        let mut pool = self.pool.lock().await;
        Self::stop_workers(&mut pool).await;

        let (shutdown, _) = watch::channel(false);
        pool.shutdown = shutdown;
        for worker_id in 0..count.max(1) {
            let rx = Arc::clone(&self.rx);
            let shutdown_rx = pool.shutdown.subscribe();
            let poll_timeout = self.poll_timeout;
            pool.workers.push(tokio::spawn(worker_loop(
                worker_id,
                rx,
                shutdown_rx,
                poll_timeout,
            )));
        }
        info!(workers = count.max(1), "replay worker pool started");
    }

    /// Stop all workers. The queue stays open; [`ReplayEngine::resize`]
    /// restarts consumption.
    pub async fn shutdown(&self) {
        let mut pool = self.pool.lock().await;
        Self::stop_workers(&mut pool).await;
        info!("replay worker pool stopped");
    }

    /// Current number of workers.
    pub async fn worker_count(&self) -> usize {
        self.pool.lock().await.workers.len()
    }

    async fn stop_workers(pool: &mut WorkerPool) {
        if pool.workers.is_empty() {
            return;
        }
        let _ = pool.shutdown.send(true);
        for handle in pool.workers.drain(..) {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<UpdateToReplay>>>,
    shutdown_rx: watch::Receiver<bool>,
    poll_timeout: Duration,
) {
    debug!(worker_id, "replay worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        // Coordination lock: dequeue + mark-active must be atomic with
        // respect to pool resizing. Replay happens after the lock is gone.
        let next = {
            let mut rx = rx.lock().await;
            match timeout(poll_timeout, rx.recv()).await {
                Ok(Some(update)) => {
                    update.domain.pending_changes().mark_in_progress(&update.msg);
                    Some(update)
                }
                Ok(None) => break,
                Err(_) => None,
            }
        };
        if let Some(update) = next {
            update.domain.replay(update.msg);
        }
    }
    debug!(worker_id, "replay worker stopped");
}
