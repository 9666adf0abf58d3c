//! Client side of the broker protocol.
//!
//! A [`ConnectionManager`] turns a [`ConnectionTarget`] and [`Credentials`]
//! into a [`Session`]; a session opens [`QueueHandle`]s for publishing and
//! receiving. Connecting is a single attempt: retry policy belongs to callers.

mod config;
mod connection;
mod publisher;
mod queue;
mod target;

pub use config::{load_settings, MqSettings, ENV_PREFIX};
pub use connection::{ConnectionManager, Session};
pub use publisher::{publish_json, OneShotPublisher};
pub use queue::QueueHandle;
pub use target::{ConnectionTarget, Credentials, Endpoint, DEFAULT_PORT};

pub use primeq_protocol::{Envelope, HandleId, MessageId, OpenMode, ReasonCode, SessionId};

use primeq_protocol::{MessageType, ProtocolError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("Connection to {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection rejected ({reason}): {detail}")]
    Rejected { reason: ReasonCode, detail: String },

    #[error("Failed to open {queue} ({reason}): {detail}")]
    Open {
        queue: String,
        reason: ReasonCode,
        detail: String,
    },

    #[error("Failed to publish to {queue} ({reason}): {detail}")]
    Publish {
        queue: String,
        reason: ReasonCode,
        detail: String,
    },

    #[error("Failed to receive from {queue} ({reason}): {detail}")]
    Receive {
        queue: String,
        reason: ReasonCode,
        detail: String,
    },

    #[error("Queue {queue} is not open for {operation}")]
    ModeNotAllowed {
        queue: String,
        operation: &'static str,
    },

    #[error("Queue handle for {0} is closed")]
    HandleClosed(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected reply: {0:?}")]
    UnexpectedReply(MessageType),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Broker reason code, when the broker answered with a failure
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            ClientError::Rejected { reason, .. }
            | ClientError::Open { reason, .. }
            | ClientError::Publish { reason, .. }
            | ClientError::Receive { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
