use serde::Serialize;

use super::job::{BatchId, Identifier, JobId};
use super::priority::Priority;
use super::serialisable::WireSerialisable;
use super::states::BatchStatus;
use crate::dispatcher::DispatchStats;

/// A command sent by the client to the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IngestCommand {
    /// Submits a job made of the given identifiers. The job is stored and
    /// queued before the response is sent.
    ///
    /// On the wire: `submit <priority> [<id> ...]`
    Submit {
        priority: Priority,
        identifiers: Vec<Identifier>,
    },
    /// Reports a job's overall and per-batch progress.
    ///
    /// On the wire: `status <job-id>`
    Status { job_id: JobId },
    /// Reports service-wide counters.
    ///
    /// On the wire: `stats`
    Stats,
    /// Closes the connection.
    ///
    /// On the wire: `quit`
    Quit,
}

/// A response sent by the server to the client.
#[derive(Debug)]
pub enum IngestResponse {
    /// The server hit a problem it could not attribute to the request.
    ///
    /// On the wire: `INTERNAL_ERROR`.
    InternalError,
    /// The line was malformed: a bad priority, identifier, or job id.
    ///
    /// On the wire: `BAD_FORMAT`.
    BadFormat,
    /// On the wire: `UNKNOWN_COMMAND`.
    UnknownCommand,
    /// The line exceeded the maximum length. The server closes the
    /// connection after sending this.
    ///
    /// On the wire: `LINE_TOO_LONG`.
    LineTooLong,
    /// In response to a `submit`, the new job's id.
    ///
    /// On the wire: `SUBMITTED <job-id>`.
    Submitted { job_id: JobId },
    /// In response to a `status`, the job is unknown.
    ///
    /// On the wire: `NOT_FOUND`.
    NotFound,
    /// In response to a `status`, indicates success.
    ///
    /// On the wire: `OK <n_bytes>` plus data in YAML dictionary format.
    OkStatus { data: JobReport },
    /// In response to a `stats`, indicates success.
    ///
    /// On the wire: `OK <n_bytes>` plus data in YAML dictionary format.
    OkStats { data: ServiceStats },
}

impl WireSerialisable for IngestResponse {
    fn serialise_wire(&self) -> Vec<u8> {
        use IngestResponse::*;

        match self {
            InternalError => b"INTERNAL_ERROR\r\n".to_vec(),
            BadFormat => b"BAD_FORMAT\r\n".to_vec(),
            UnknownCommand => b"UNKNOWN_COMMAND\r\n".to_vec(),
            LineTooLong => b"LINE_TOO_LONG\r\n".to_vec(),
            Submitted { job_id } => format!("SUBMITTED {job_id}\r\n").into(),
            NotFound => b"NOT_FOUND\r\n".to_vec(),
            OkStatus { data } => ok_yaml(data),
            OkStats { data } => ok_yaml(data),
        }
    }
}

fn ok_yaml<T: Serialize>(data: &T) -> Vec<u8> {
    match serde_yaml::to_string(data) {
        Ok(data) => format!("OK {}\r\n{data}\r\n", data.len()).into(),
        Err(_) => IngestResponse::InternalError.serialise_wire(),
    }
}

/// A snapshot of one job's progress.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct JobReport {
    /// job id
    #[serde(rename = "job-id")]
    pub job_id: JobId,
    /// priority the job was submitted with
    pub priority: Priority,
    /// status derived from all of the job's batches
    pub status: BatchStatus,
    /// time in seconds since submission
    pub age: u64,
    /// every batch, in submission order
    pub batches: Vec<BatchReport>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BatchReport {
    #[serde(rename = "batch-id")]
    pub batch_id: BatchId,
    pub identifiers: Vec<Identifier>,
    pub status: BatchStatus,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceStats {
    /// number of jobs accepted since startup
    #[serde(rename = "total-jobs")]
    pub total_jobs: u64,
    /// number of batches waiting for dispatch
    #[serde(rename = "current-batches-queued")]
    pub current_batches_queued: u64,
    #[serde(flatten)]
    pub dispatch: DispatchStats,
    /// version string of the server
    pub version: &'static str,
}
