//! Drains the priority queue one batch at a time, leaving a minimum interval
//! between batches.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::select;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::processor::Processor;
use crate::queue::{PriorityQueue, QueueEntry};
use crate::store::JobStore;
use crate::types::job::Job;
use crate::types::states::BatchStatus;

/// Default minimum gap between one batch finishing and the next starting.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Cumulative dispatcher counters, as reported by `stats`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DispatchStats {
    /// number of batches taken off the queue and completed
    #[serde(rename = "batches-dispatched")]
    pub batches_dispatched: u64,
    /// number of identifiers the processor accepted
    #[serde(rename = "identifiers-processed")]
    pub identifiers_processed: u64,
    /// number of identifiers the processor failed on
    #[serde(rename = "identifier-failures")]
    pub identifier_failures: u64,
    /// number of status updates that referenced an unknown job or batch
    #[serde(rename = "status-anomalies")]
    pub status_anomalies: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches_dispatched: AtomicU64,
    identifiers_processed: AtomicU64,
    identifier_failures: AtomicU64,
    status_anomalies: AtomicU64,
}

/// Single-flight batch dispatcher.
///
/// At most one batch is processed at a time, whether it was picked up by the
/// background loop or by a direct `dispatch_one` call. After a batch
/// completes, the next one does not start until `min_interval` has passed, so
/// consecutive batch starts are always at least that far apart.
pub struct Dispatcher {
    queue: PriorityQueue,
    store: Arc<dyn JobStore>,
    processor: Arc<dyn Processor>,
    min_interval: Duration,
    /// Held for the whole of a dispatch. Records when the previous batch
    /// completed.
    last_completed: AsyncMutex<Option<Instant>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<dyn Processor>,
        min_interval: Duration,
    ) -> Self {
        Self {
            queue: PriorityQueue::new(),
            store,
            processor,
            min_interval,
            last_completed: AsyncMutex::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Spawns the dispatch loop onto the current runtime. Calling this again
    /// while a loop exists does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);

        if task.is_some() {
            warn!("dispatcher already started");
            return;
        }

        *task = Some(tokio::spawn(Arc::clone(self).run()));
    }

    /// Signals the loop to exit and waits for it. A batch already in flight
    /// is allowed to finish; nothing still queued is dispatched by the loop.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            if let Err(error) = task.await {
                error!(%error, "dispatch loop exited abnormally");
            }
        }
    }

    /// Queues every batch of `job` under the job's priority.
    pub fn submit(&self, job: &Job) {
        for batch in &job.batches {
            self.queue.enqueue(job.id, batch.clone(), job.priority);
        }

        debug!(
            job = %job.id,
            priority = %job.priority,
            batches = job.batches.len(),
            "queued job",
        );
    }

    /// Dispatches the next batch, first waiting out the rate limit if
    /// needed. Returns false if there was nothing to dispatch or the
    /// dispatcher was stopped while waiting.
    pub async fn dispatch_one(&self) -> bool {
        self.dispatch(true).await
    }

    /// As `dispatch_one`, but returns false rather than waiting if the rate
    /// limit is not yet satisfied.
    pub async fn try_dispatch_one(&self) -> bool {
        self.dispatch(false).await
    }

    /// Number of batches waiting.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;

        DispatchStats {
            batches_dispatched: c.batches_dispatched.load(Ordering::Relaxed),
            identifiers_processed: c
                .identifiers_processed
                .load(Ordering::Relaxed),
            identifier_failures: c.identifier_failures.load(Ordering::Relaxed),
            status_anomalies: c.status_anomalies.load(Ordering::Relaxed),
        }
    }

    #[instrument(name = "dispatcher", skip_all)]
    async fn run(self: Arc<Self>) {
        info!(min_interval = ?self.min_interval, "dispatch loop started");

        while !self.cancel.is_cancelled() {
            if self.queue.is_empty() {
                select! {
                    _ = self.queue.wait_for_entries() => {},
                    _ = self.cancel.cancelled() => break,
                }
                continue;
            }

            self.dispatch_one().await;
        }

        info!("dispatch loop stopped");
    }

    async fn dispatch(&self, wait: bool) -> bool {
        if self.queue.is_empty() {
            return false;
        }

        let mut last_completed = self.last_completed.lock().await;

        if let Some(remaining) = self.remaining_interval(*last_completed) {
            if !wait {
                return false;
            }

            trace!(?remaining, "waiting out rate limit");
            select! {
                _ = sleep(remaining) => {},
                _ = self.cancel.cancelled() => return false,
            }
        }

        // Taken only now, so anything of higher priority that arrived during
        // the wait goes first.
        let Some(entry) = self.queue.extract_next() else {
            return false;
        };

        self.process_batch(entry).await;
        *last_completed = Some(Instant::now());

        true
    }

    fn remaining_interval(&self, last: Option<Instant>) -> Option<Duration> {
        let remaining = self.min_interval.checked_sub(last?.elapsed())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    #[instrument(
        name = "batch",
        skip_all,
        fields(
            job = %entry.job_id,
            batch = %entry.batch.id,
            priority = %entry.priority
        )
    )]
    async fn process_batch(&self, entry: QueueEntry) {
        debug!(
            size = entry.batch.identifiers.len(),
            waited = ?entry.enqueued.elapsed(),
            "dispatching batch",
        );

        self.set_status(&entry, BatchStatus::InProgress);

        let mut failures = 0u64;
        for &identifier in &entry.batch.identifiers {
            match self.processor.process(identifier).await {
                Ok(()) => {
                    self.counters
                        .identifiers_processed
                        .fetch_add(1, Ordering::Relaxed);
                },
                Err(error) => {
                    warn!(%error, identifier, "processing failed");
                    failures += 1;
                    self.counters
                        .identifier_failures
                        .fetch_add(1, Ordering::Relaxed);
                },
            }
        }

        self.set_status(&entry, BatchStatus::Completed);
        self.counters
            .batches_dispatched
            .fetch_add(1, Ordering::Relaxed);

        info!(failures, "batch completed");
    }

    fn set_status(&self, entry: &QueueEntry, status: BatchStatus) {
        if !self
            .store
            .update_batch_status(&entry.job_id, &entry.batch.id, status)
        {
            error!(%status, "status update referenced an unknown job or batch");
            self.counters
                .status_anomalies
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}
