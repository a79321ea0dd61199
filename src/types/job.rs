use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::priority::Priority;
use super::states::BatchStatus;
use crate::error::IngestError;

/// An opaque value a caller wants processed. Duplicates are allowed.
pub type Identifier = i64;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| IngestError::MalformedJobId(s.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A bounded chunk of identifiers, dispatched as one unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    pub id: BatchId,
    pub identifiers: Vec<Identifier>,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(identifiers: Vec<Identifier>) -> Self {
        Self {
            id: BatchId::new(),
            identifiers,
            status: BatchStatus::NotStarted,
        }
    }
}

/// One ingestion request. Its batch list is fixed at creation; only the
/// batches' statuses change afterwards.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub priority: Priority,
    pub created: Instant,
    pub batches: Vec<Batch>,
}

impl Job {
    pub fn new(priority: Priority, batches: Vec<Batch>) -> Self {
        Self {
            id: JobId::new(),
            priority,
            created: Instant::now(),
            batches,
        }
    }

    pub fn batch(&self, batch_id: &BatchId) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == *batch_id)
    }
}
