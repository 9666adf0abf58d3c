use crate::connection::SessionInner;
use crate::{ClientError, Result};
use primeq_protocol::{
    Envelope, GetRequest, HandleId, Message, MessageId, OpenMode, PutRequest, SessionId,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A queue opened under one session with a fixed mode
pub struct QueueHandle {
    session: Arc<SessionInner>,
    handle: HandleId,
    queue: String,
    mode: OpenMode,
    closed: bool,
}

impl QueueHandle {
    pub(crate) fn new(
        session: Arc<SessionInner>,
        handle: HandleId,
        queue: String,
        mode: OpenMode,
    ) -> Self {
        QueueHandle {
            session,
            handle,
            queue,
            mode,
            closed: false,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Publish one message outside of any unit of work.
    ///
    /// Returns once the broker has accepted the message.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<MessageId> {
        self.ensure_usable(self.mode.allows_output(), "output")?;

        let request = Message::Put(PutRequest {
            handle: self.handle,
            payload,
        });

        match self.session.request(request, self.session.request_timeout()).await? {
            Message::PutAck(message_id) => {
                debug!("Published message {} to {}", message_id, self.queue);
                Ok(message_id)
            }
            Message::Failure(failure) => Err(ClientError::Publish {
                queue: self.queue.clone(),
                reason: failure.reason,
                detail: failure.detail,
            }),
            other => Err(ClientError::UnexpectedReply(other.message_type())),
        }
    }

    /// Receive one message, waiting up to `wait`.
    ///
    /// `Ok(None)` means the wait elapsed with the queue empty.
    pub async fn receive(&self, wait: Duration) -> Result<Option<Envelope>> {
        self.ensure_usable(self.mode.allows_input(), "input")?;

        let request = Message::Get(GetRequest {
            handle: self.handle,
            wait_ms: wait.as_millis() as u64,
        });
        let deadline = wait + self.session.request_timeout();

        match self.session.request(request, deadline).await? {
            Message::Delivered(envelope) => Ok(Some(envelope)),
            Message::NoMessage => Ok(None),
            Message::Failure(failure) => Err(ClientError::Receive {
                queue: self.queue.clone(),
                reason: failure.reason,
                detail: failure.detail,
            }),
            other => Err(ClientError::UnexpectedReply(other.message_type())),
        }
    }

    /// Close the handle. Closing twice, or after the session ended, is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session.forget_handle(self.handle);

        match self
            .session
            .request(Message::Close(self.handle), self.session.request_timeout())
            .await
        {
            Ok(Message::Closed) | Err(ClientError::SessionClosed) => Ok(()),
            Ok(other) => Err(ClientError::UnexpectedReply(other.message_type())),
            Err(e) => Err(e),
        }
    }

    fn ensure_usable(&self, allowed: bool, operation: &'static str) -> Result<()> {
        if self.closed {
            return Err(ClientError::HandleClosed(self.queue.clone()));
        }
        if !allowed {
            return Err(ClientError::ModeNotAllowed {
                queue: self.queue.clone(),
                operation,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("session", &self.session.id())
            .field("handle", &self.handle)
            .field("queue", &self.queue)
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .finish()
    }
}
