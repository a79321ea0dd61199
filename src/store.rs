//! Job persistence, consumed through the `JobStore` trait.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;
use crate::types::job::{BatchId, Job, JobId};
use crate::types::states::BatchStatus;

pub trait JobStore: Send + Sync {
    /// Stores a new job, keyed by its identifier.
    fn create(&self, job: Job) -> Result<(), StoreError>;

    /// Returns a snapshot of the job, if known.
    fn get(&self, job_id: &JobId) -> Option<Job>;

    /// Sets the status of one batch. Returns false if either the job or the
    /// batch is unknown. Monotonicity is the caller's responsibility.
    fn update_batch_status(
        &self,
        job_id: &JobId,
        batch_id: &BatchId,
        status: BatchStatus,
    ) -> bool;

    /// Number of jobs held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps jobs in a map guarded by its own lock, independent of the queue's.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        match jobs.entry(job.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            },
        }
    }

    fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    fn update_batch_status(
        &self,
        job_id: &JobId,
        batch_id: &BatchId,
        status: BatchStatus,
    ) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };

        match job.batches.iter_mut().find(|b| b.id == *batch_id) {
            Some(batch) => {
                batch.status = status;
                true
            },
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::job::Batch;
    use crate::types::priority::Priority;

    fn job() -> Job {
        Job::new(
            Priority::High,
            vec![Batch::new(vec![1, 2, 3]), Batch::new(vec![4])],
        )
    }

    #[test]
    fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let job = job();
        let id = job.id;

        assert!(store.is_empty());
        store.create(job).unwrap();
        assert_eq!(store.len(), 1);

        let got = store.get(&id).unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.priority, Priority::High);
        assert_eq!(got.batches.len(), 2);

        assert!(store.get(&JobId::new()).is_none());
    }

    #[test]
    fn test_duplicate_key() {
        let store = MemoryJobStore::new();
        let job = job();
        let id = job.id;

        store.create(job.clone()).unwrap();
        assert_eq!(store.create(job), Err(StoreError::DuplicateKey(id)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_batch_status() {
        let store = MemoryJobStore::new();
        let job = job();
        let (id, first, second) = (job.id, job.batches[0].id, job.batches[1].id);
        store.create(job).unwrap();

        assert!(store.update_batch_status(&id, &first, BatchStatus::InProgress));

        let got = store.get(&id).unwrap();
        assert_eq!(got.batch(&first).unwrap().status, BatchStatus::InProgress);
        assert_eq!(got.batch(&second).unwrap().status, BatchStatus::NotStarted);

        // Unknown job or batch is reported, not applied.
        assert!(!store.update_batch_status(
            &JobId::new(),
            &first,
            BatchStatus::Completed
        ));
        assert!(!store.update_batch_status(
            &id,
            &BatchId::new(),
            BatchStatus::Completed
        ));
        let got = store.get(&id).unwrap();
        assert_eq!(got.batch(&first).unwrap().status, BatchStatus::InProgress);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = MemoryJobStore::new();
        let job = job();
        let (id, first) = (job.id, job.batches[0].id);
        store.create(job).unwrap();

        let before = store.get(&id).unwrap();
        store.update_batch_status(&id, &first, BatchStatus::Completed);

        assert_eq!(before.batches[0].status, BatchStatus::NotStarted);
        assert_eq!(
            store.get(&id).unwrap().batches[0].status,
            BatchStatus::Completed
        );
    }
}
