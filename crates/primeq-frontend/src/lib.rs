//! HTTP front end: keeps work records in a record store and sends them to
//! the worker's inbound queue.

pub mod api;
pub mod config;
pub mod store;

pub use api::{create_router, AppState};
pub use config::FrontendConfig;
pub use store::{generate, MemoryRecordStore, RecordStore, StoreError};
