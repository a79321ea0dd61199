//! The downstream operation applied to each identifier.
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::ProcessError;
use crate::types::job::Identifier;

/// An external, possibly slow, per-identifier operation. Calls are made one
/// at a time and are not cancelled once started.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, identifier: Identifier) -> Result<(), ProcessError>;
}

/// Stands in for a real downstream call: waits a fixed delay, then succeeds.
#[derive(Clone, Debug)]
pub struct SimulatedProcessor {
    delay: Duration,
}

impl SimulatedProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Processor for SimulatedProcessor {
    async fn process(&self, identifier: Identifier) -> Result<(), ProcessError> {
        trace!(identifier, delay = ?self.delay, "simulating downstream call");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_delay() {
        let processor = SimulatedProcessor::new(Duration::from_secs(1));
        let start = Instant::now();

        processor.process(42).await.unwrap();
        processor.process(-1).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
