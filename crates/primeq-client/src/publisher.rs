use crate::{ConnectionManager, QueueHandle, Result, Session};
use primeq_protocol::{MessageId, OpenMode};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Serialize `record` as JSON and publish it on an output handle
pub async fn publish_json<T: Serialize>(handle: &QueueHandle, record: &T) -> Result<MessageId> {
    let payload = serde_json::to_vec(record)?;
    handle.publish(payload).await
}

/// Publishes each message through its own short-lived output handle.
///
/// The session is opened lazily, shared by all calls and re-established
/// after it is lost.
pub struct OneShotPublisher {
    manager: ConnectionManager,
    queue: String,
    session: Mutex<Option<Session>>,
}

impl OneShotPublisher {
    pub fn new(manager: ConnectionManager, queue: impl Into<String>) -> Self {
        OneShotPublisher {
            manager,
            queue: queue.into(),
            session: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Open an output handle, publish `record`, close the handle
    pub async fn publish<T: Serialize>(&self, record: &T) -> Result<MessageId> {
        let payload = serde_json::to_vec(record)?;
        let mut handle = self.open_output().await?;

        let published = handle.publish(payload).await;
        if let Err(e) = handle.close().await {
            debug!("Closing output handle for {} failed: {}", self.queue, e);
        }

        if published.is_err() {
            self.reset_if_disconnected().await;
        }
        published
    }

    /// Drop the cached session, if any
    pub async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            if let Err(e) = session.disconnect().await {
                warn!("Publisher disconnect failed: {}", e);
            }
        }
    }

    async fn open_output(&self) -> Result<QueueHandle> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_connected().await {
                match session.open(&self.queue, OpenMode::Output).await {
                    Ok(handle) => return Ok(handle),
                    Err(e) if session.is_connected().await => return Err(e),
                    Err(e) => debug!("Cached session lost, reconnecting: {}", e),
                }
            }
        }

        let session = self.manager.connect().await?;
        let handle = session.open(&self.queue, OpenMode::Output).await;
        *guard = Some(session);
        handle
    }

    async fn reset_if_disconnected(&self) {
        let mut guard = self.session.lock().await;
        let lost = match guard.as_ref() {
            Some(session) => !session.is_connected().await,
            None => false,
        };
        if lost {
            *guard = None;
        }
    }
}
