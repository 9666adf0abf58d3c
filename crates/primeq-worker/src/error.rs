use primeq_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// The broker faulted during a receive; the consumer does not recover from this
    #[error("Receive from {queue} failed: {source}")]
    ReceiveFault {
        queue: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to open {queue}: {source}")]
    Open {
        queue: String,
        #[source]
        source: ClientError,
    },
}
