//! The process-scoped context tying the store, queue and dispatcher
//! together behind the two caller-facing operations.
use std::sync::Arc;

use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::batching;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::IngestError;
use crate::processor::{Processor, SimulatedProcessor};
use crate::store::{JobStore, MemoryJobStore};
use crate::types::job::{Identifier, Job, JobId};
use crate::types::priority::Priority;
use crate::types::protocol::{BatchReport, JobReport, ServiceStats};

pub struct IngestionService {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
}

impl IngestionService {
    /// Builds a service around the given store and processor. The dispatch
    /// loop is not running until `start` is called.
    pub fn new(
        config: &Config,
        store: Arc<dyn JobStore>,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, IngestError> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            processor,
            config.rate_limit(),
        ));

        Ok(Self {
            store,
            dispatcher,
            batch_size: config.batch_size,
        })
    }

    /// Builds a service with an in-memory store and a simulated processor.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        Self::new(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(SimulatedProcessor::new(config.process_delay())),
        )
    }

    pub fn start(&self) {
        self.dispatcher.start();
    }

    /// Stops the dispatch loop, letting any in-flight batch finish.
    pub async fn shutdown(&self) {
        self.dispatcher.stop().await;
        info!(queued = self.dispatcher.queued(), "ingestion service stopped");
    }

    /// Accepts a job. It is stored before any of its batches are queued, so
    /// the dispatcher never sees a batch whose job is missing.
    pub fn submit_job(
        &self,
        identifiers: &[Identifier],
        priority: Priority,
    ) -> Result<JobId, IngestError> {
        let batches = batching::split(identifiers, self.batch_size)?;
        let job = Job::new(priority, batches);
        let job_id = job.id;

        self.store.create(job.clone())?;
        self.dispatcher.submit(&job);

        debug!(
            job = %job_id,
            %priority,
            identifiers = identifiers.len(),
            "accepted job",
        );

        Ok(job_id)
    }

    /// Reports a job's progress. The overall status is derived afresh from
    /// the batches on every call.
    pub fn get_status(&self, job_id: &JobId) -> Result<JobReport, IngestError> {
        let job = self
            .store
            .get(job_id)
            .ok_or(IngestError::NotFound(*job_id))?;

        Ok(JobReport {
            job_id: job.id,
            priority: job.priority,
            status: aggregate(job.batches.iter().map(|b| b.status)),
            age: job.created.elapsed().as_secs(),
            batches: job
                .batches
                .into_iter()
                .map(|b| BatchReport {
                    batch_id: b.id,
                    identifiers: b.identifiers,
                    status: b.status,
                })
                .collect(),
        })
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            total_jobs: self.store.len() as u64,
            current_batches_queued: self.dispatcher.queued() as u64,
            dispatch: self.dispatcher.stats(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
