use primeq_core::{RecordError, ResultRecord, WorkRecord};
use tracing::debug;

/// Turns one inbound payload into the result to post.
///
/// An error means the message is malformed and is dropped without a reply.
pub trait RecordHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> Result<ResultRecord, RecordError>;
}

/// Miller-Rabin check of the record's value
pub struct PrimalityHandler {
    rounds: u32,
}

impl PrimalityHandler {
    pub fn new(rounds: u32) -> Self {
        PrimalityHandler { rounds }
    }
}

impl RecordHandler for PrimalityHandler {
    fn handle(&self, payload: &[u8]) -> Result<ResultRecord, RecordError> {
        let record = WorkRecord::from_payload(payload)?;
        let result = record.evaluate(self.rounds)?;

        debug!(
            "Record {}: {} digits, prime = {}",
            result.id,
            result.value.len(),
            result.prime
        );
        Ok(result)
    }
}
