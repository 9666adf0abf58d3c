mod codec;
mod message;

pub use codec::MessageCodec;
pub use message::{
    ConnectRequest, Envelope, Failure, GetRequest, HandleId, Message, MessageId, MessageType,
    OpenMode, OpenRequest, PutRequest, ReasonCode, SessionId,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Frame has no message type")]
    EmptyFrame,

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum frame size: 11MB (10MB message payload + overhead)
pub const MAX_MESSAGE_SIZE: usize = 11 * 1024 * 1024;

/// Largest payload a single put may carry
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;
