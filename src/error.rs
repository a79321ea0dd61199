use thiserror::Error;

use crate::types::job::{Identifier, JobId};

/// Errors surfaced to callers of the ingestion service.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A configuration value is out of range, e.g. a zero batch size.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A job identifier could not be parsed.
    #[error("malformed job id {0:?}")]
    MalformedJobId(String),
    /// No job exists with this identifier.
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("job {0} already exists")]
    DuplicateKey(JobId),
}

/// A failure of the downstream processing call for a single identifier.
/// These never leave the dispatcher.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("processing identifier {identifier} failed: {reason}")]
pub struct ProcessError {
    pub identifier: Identifier,
    pub reason: String,
}

impl ProcessError {
    pub fn new(identifier: Identifier, reason: impl Into<String>) -> Self {
        Self {
            identifier,
            reason: reason.into(),
        }
    }
}
