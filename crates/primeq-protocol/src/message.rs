use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a session on the broker
pub type SessionId = Uuid;

/// Identifies an open queue within one session
pub type HandleId = u64;

/// Broker-assigned message identifier
pub type MessageId = Uuid;

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Connect = 1,
    Connected = 2,
    Open = 3,
    Opened = 4,
    Put = 5,
    PutAck = 6,
    Get = 7,
    Delivered = 8,
    NoMessage = 9,
    Close = 10,
    Closed = 11,
    Disconnect = 12,
    Failure = 13,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Connect),
            2 => Some(MessageType::Connected),
            3 => Some(MessageType::Open),
            4 => Some(MessageType::Opened),
            5 => Some(MessageType::Put),
            6 => Some(MessageType::PutAck),
            7 => Some(MessageType::Get),
            8 => Some(MessageType::Delivered),
            9 => Some(MessageType::NoMessage),
            10 => Some(MessageType::Close),
            11 => Some(MessageType::Closed),
            12 => Some(MessageType::Disconnect),
            13 => Some(MessageType::Failure),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages. Every request is answered by exactly one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Authenticate and bind the connection to a queue manager
    Connect(ConnectRequest),

    /// Session established
    Connected(SessionId),

    /// Open a queue in the given mode
    Open(OpenRequest),

    /// Queue opened
    Opened(HandleId),

    /// Publish one message, committed on receipt
    Put(PutRequest),

    /// Put accepted by the broker
    PutAck(MessageId),

    /// Receive one message, waiting up to `wait_ms`
    Get(GetRequest),

    /// A message taken off the queue
    Delivered(Envelope),

    /// Nothing arrived within the wait interval
    NoMessage,

    /// Close a handle
    Close(HandleId),

    /// Close or disconnect acknowledged
    Closed,

    /// End the session
    Disconnect,

    /// Request rejected
    Failure(Failure),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connect(_) => MessageType::Connect,
            Message::Connected(_) => MessageType::Connected,
            Message::Open(_) => MessageType::Open,
            Message::Opened(_) => MessageType::Opened,
            Message::Put(_) => MessageType::Put,
            Message::PutAck(_) => MessageType::PutAck,
            Message::Get(_) => MessageType::Get,
            Message::Delivered(_) => MessageType::Delivered,
            Message::NoMessage => MessageType::NoMessage,
            Message::Close(_) => MessageType::Close,
            Message::Closed => MessageType::Closed,
            Message::Disconnect => MessageType::Disconnect,
            Message::Failure(_) => MessageType::Failure,
        }
    }

    pub fn failure(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Message::Failure(Failure {
            reason,
            detail: detail.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub queue_manager: String,
    pub channel: String,
    pub user: String,
    pub password: Option<String>,
    /// Free-form label shown in broker logs
    pub client_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenMode {
    Input,
    Output,
    InputOutput,
}

impl OpenMode {
    pub fn allows_input(&self) -> bool {
        matches!(self, OpenMode::Input | OpenMode::InputOutput)
    }

    pub fn allows_output(&self) -> bool {
        matches!(self, OpenMode::Output | OpenMode::InputOutput)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Input => "input",
            OpenMode::Output => "output",
            OpenMode::InputOutput => "input+output",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    pub queue: String,
    pub mode: OpenMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub handle: HandleId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub handle: HandleId,
    pub wait_ms: u64,
}

/// A message as stored on a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,
    pub put_time: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(payload: Vec<u8>) -> Self {
        Envelope {
            message_id: Uuid::new_v4(),
            put_time: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    NotAuthorized,
    UnknownQueueManager,
    UnknownChannel,
    UnknownQueue,
    InvalidHandle,
    NotOpenForInput,
    NotOpenForOutput,
    QueueFull,
    NotConnected,
    ProtocolViolation,
    Internal,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NotAuthorized => "not_authorized",
            ReasonCode::UnknownQueueManager => "unknown_queue_manager",
            ReasonCode::UnknownChannel => "unknown_channel",
            ReasonCode::UnknownQueue => "unknown_queue",
            ReasonCode::InvalidHandle => "invalid_handle",
            ReasonCode::NotOpenForInput => "not_open_for_input",
            ReasonCode::NotOpenForOutput => "not_open_for_output",
            ReasonCode::QueueFull => "queue_full",
            ReasonCode::NotConnected => "not_connected",
            ReasonCode::ProtocolViolation => "protocol_violation",
            ReasonCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub reason: ReasonCode,
    pub detail: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::from_u8(1), Some(MessageType::Connect));
        assert_eq!(MessageType::from_u8(13), Some(MessageType::Failure));
        assert_eq!(MessageType::from_u8(0), None);
        assert_eq!(MessageType::from_u8(99), None);

        assert_eq!(MessageType::Get.as_u8(), 7);
        assert_eq!(Message::NoMessage.message_type(), MessageType::NoMessage);
    }

    #[test]
    fn test_open_mode_capabilities() {
        assert!(OpenMode::Input.allows_input());
        assert!(!OpenMode::Input.allows_output());
        assert!(OpenMode::Output.allows_output());
        assert!(!OpenMode::Output.allows_input());
        assert!(OpenMode::InputOutput.allows_input());
        assert!(OpenMode::InputOutput.allows_output());
    }
}
