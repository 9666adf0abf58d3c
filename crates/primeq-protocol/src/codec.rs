use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
///
/// The length covers the type byte and the payload. Replies without a body
/// (`NoMessage`, `Closed`, `Disconnect`) carry an empty payload.
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < 5 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }
        if length == 0 {
            src.advance(4);
            return Err(ProtocolError::EmptyFrame);
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);

        let msg_type_byte = src.get_u8();
        let msg_type = match MessageType::from_u8(msg_type_byte) {
            Some(msg_type) => msg_type,
            None => {
                src.advance(length - 1);
                return Err(ProtocolError::InvalidMessageType(msg_type_byte));
            }
        };

        let payload = src.split_to(length - 1);

        let message = match msg_type {
            MessageType::Connect => Message::Connect(bincode::deserialize(&payload)?),
            MessageType::Connected => Message::Connected(bincode::deserialize(&payload)?),
            MessageType::Open => Message::Open(bincode::deserialize(&payload)?),
            MessageType::Opened => Message::Opened(bincode::deserialize(&payload)?),
            MessageType::Put => Message::Put(bincode::deserialize(&payload)?),
            MessageType::PutAck => Message::PutAck(bincode::deserialize(&payload)?),
            MessageType::Get => Message::Get(bincode::deserialize(&payload)?),
            MessageType::Delivered => Message::Delivered(bincode::deserialize(&payload)?),
            MessageType::NoMessage => Message::NoMessage,
            MessageType::Close => Message::Close(bincode::deserialize(&payload)?),
            MessageType::Closed => Message::Closed,
            MessageType::Disconnect => Message::Disconnect,
            MessageType::Failure => Message::Failure(bincode::deserialize(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::Connect(req) => bincode::serialize(req)?,
            Message::Connected(session_id) => bincode::serialize(session_id)?,
            Message::Open(req) => bincode::serialize(req)?,
            Message::Opened(handle) => bincode::serialize(handle)?,
            Message::Put(req) => bincode::serialize(req)?,
            Message::PutAck(message_id) => bincode::serialize(message_id)?,
            Message::Get(req) => bincode::serialize(req)?,
            Message::Delivered(envelope) => bincode::serialize(envelope)?,
            Message::Close(handle) => bincode::serialize(handle)?,
            Message::Failure(failure) => bincode::serialize(failure)?,
            Message::NoMessage | Message::Closed | Message::Disconnect => Vec::new(),
        };

        let total_length = 1 + payload.len();
        if total_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}
