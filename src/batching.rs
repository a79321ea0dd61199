//! Splits a submission's identifiers into fixed-size batches.
use crate::error::IngestError;
use crate::types::job::{Batch, Identifier};

pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Partitions `identifiers` into contiguous batches of `max_size`, preserving
/// order. Only the last batch may be short. An empty input gives no batches.
pub fn split(
    identifiers: &[Identifier],
    max_size: usize,
) -> Result<Vec<Batch>, IngestError> {
    if max_size == 0 {
        return Err(IngestError::InvalidConfiguration(
            "batch size must be positive".into(),
        ));
    }

    Ok(identifiers
        .chunks(max_size)
        .map(|chunk| Batch::new(chunk.to_vec()))
        .collect())
}
