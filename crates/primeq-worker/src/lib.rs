pub mod config;
pub mod consumer;
pub mod error;
pub mod handler;

pub use config::{ConsumerSettings, WorkerConfig};
pub use consumer::{Consumer, ConsumerState, ConsumerStats, StatsSnapshot};
pub use error::WorkerError;
pub use handler::{PrimalityHandler, RecordHandler};
