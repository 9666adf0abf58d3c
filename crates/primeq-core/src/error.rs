use thiserror::Error;

/// Reasons a work payload is rejected before it reaches the primality engine.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, RecordError>;
