use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hub_link::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;

use super::connection::ConnectionManager;
use crate::intent::rules;

/// Delivery counters, readable from tests and the shutdown log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped: u64,
}

enum Job {
    Deliver(Command),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    /// Queued plus the one currently being sent.
    pending: AtomicUsize,
}

/// Queues matched commands for a single tracked sender loop.
///
/// The caller never waits on the network. Commands reach the downstream
/// peer in the order they were dispatched. Failed deliveries are logged and
/// counted, never retried.
pub struct Dispatcher {
    link: Arc<ConnectionManager>,
    tracker: TaskTracker,
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    /// Taken by the sender loop when it starts.
    backlog: Mutex<Option<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// `capacity` bounds how many commands may wait behind a slow delivery.
    pub fn new(link: Arc<ConnectionManager>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            link,
            tracker: TaskTracker::new(),
            queue: Mutex::new(Some(tx)),
            backlog: Mutex::new(Some(rx)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn link(&self) -> &Arc<ConnectionManager> {
        &self.link
    }

    /// Queue delivery of `command` if its action is forwarded downstream.
    /// Returns false for recognized-only actions. A full or closed queue
    /// drops the command. Must be called inside a tokio runtime.
    pub fn dispatch(&self, command: Command) -> bool {
        if !rules::is_forwarded(&command.action) {
            tracing::info!(action = %command.action, "action recognized, not forwarded downstream");
            return false;
        }

        self.start();
        let queue = lock(&self.queue);
        let Some(tx) = queue.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(action = %command.action, "command dropped, dispatcher shut down");
            return true;
        };

        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = tx.try_send(Job::Deliver(command)) {
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, job) = match e {
                mpsc::error::TrySendError::Full(job) => ("queue full", job),
                mpsc::error::TrySendError::Closed(job) => ("queue closed", job),
            };
            if let Job::Deliver(command) = job {
                tracing::warn!(action = %command.action, reason, "command dropped");
            }
        }
        true
    }

    /// Spawn the sender loop on first use.
    fn start(&self) {
        let Some(rx) = lock(&self.backlog).take() else {
            return;
        };
        let link = self.link.clone();
        let counters = self.counters.clone();
        self.tracker.spawn(deliver_loop(link, rx, counters));
    }

    /// Commands queued or being sent.
    pub fn in_flight(&self) -> usize {
        self.counters.pending.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Wait until every command dispatched so far has been attempted.
    /// Returns immediately once the dispatcher is shut down.
    pub async fn settle(&self) {
        let Some(tx) = lock(&self.queue).clone() else {
            return;
        };
        self.start();
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Job::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Close the queue and wait for the sender loop to drain it.
    /// Returns false if the timeout expired with deliveries still pending.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        lock(&self.queue).take();
        // Never started: nothing was queued.
        lock(&self.backlog).take();
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        if !drained {
            tracing::warn!(pending = self.in_flight(), "abandoning in-flight deliveries");
        }
        drained
    }
}

async fn deliver_loop(link: Arc<ConnectionManager>, mut rx: mpsc::Receiver<Job>, counters: Arc<Counters>) {
    while let Some(job) = rx.recv().await {
        let command = match job {
            Job::Deliver(command) => command,
            Job::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };
        match link.send(&command).await {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(action = %command.action, "command sent downstream");
            }
            Err(e) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action = %command.action, error = %e, "command dropped");
            }
        }
        counters.pending.fetch_sub(1, Ordering::Relaxed);
    }
    tracing::debug!("dispatch queue closed");
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
