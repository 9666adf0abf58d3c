use crate::queue::QueueHandle;
use crate::{ClientError, ConnectionTarget, Credentials, Endpoint, MqSettings, Result};
use primeq_protocol::{
    ConnectRequest, HandleId, Message, MessageCodec, OpenMode, OpenRequest, SessionId,
};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

type Transport = Framed<TcpStream, MessageCodec>;

/// Owns connection parameters and produces sessions.
///
/// Each [`connect`](Self::connect) call is one attempt: endpoints are tried
/// in order, the first failure cause is surfaced and nothing is retried.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    target: ConnectionTarget,
    credentials: Credentials,
    client_name: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(target: ConnectionTarget, credentials: Credentials) -> Self {
        ConnectionManager {
            target,
            credentials,
            client_name: "primeq".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_settings(settings: &MqSettings) -> Result<Self> {
        let target = ConnectionTarget::from_settings(settings)?;
        let credentials = Credentials::new(settings.user.clone(), settings.password.clone());

        Ok(Self::new(target, credentials).with_timeouts(
            Duration::from_millis(settings.connect_timeout_ms),
            Duration::from_millis(settings.request_timeout_ms),
        ))
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, request_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.request_timeout = request_timeout;
        self
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Establish an authenticated session
    pub async fn connect(&self) -> Result<Session> {
        let mut last_error = None;

        for endpoint in &self.target.endpoints {
            match self.connect_endpoint(endpoint).await {
                Ok(session) => {
                    info!(
                        "Session {} established with {} at {}",
                        session.id(),
                        self.target.queue_manager,
                        endpoint
                    );
                    return Ok(session);
                }
                Err(e @ ClientError::Rejected { .. }) => {
                    warn!("Connection to {} rejected: {}", endpoint, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::InvalidTarget(self.target.to_string())))
    }

    /// Release a session and every handle it still owns
    pub async fn disconnect(&self, session: Session) -> Result<()> {
        session.disconnect().await
    }

    async fn connect_endpoint(&self, endpoint: &Endpoint) -> Result<Session> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| ClientError::Timeout(self.connect_timeout))?
        .map_err(|source| ClientError::Connection {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let mut transport = Framed::new(stream, MessageCodec);

        let request = Message::Connect(ConnectRequest {
            queue_manager: self.target.queue_manager.clone(),
            channel: self.target.channel.clone(),
            user: self.credentials.user.clone(),
            password: self.credentials.password.clone(),
            client_name: self.client_name.clone(),
        });

        let reply = tokio::time::timeout(self.request_timeout, exchange(&mut transport, request))
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))??;

        match reply {
            Message::Connected(session_id) => Ok(Session::new(
                session_id,
                transport,
                self.request_timeout,
            )),
            Message::Failure(failure) => Err(ClientError::Rejected {
                reason: failure.reason,
                detail: failure.detail,
            }),
            other => Err(ClientError::UnexpectedReply(other.message_type())),
        }
    }
}

async fn exchange(transport: &mut Transport, message: Message) -> Result<Message> {
    transport.send(message).await?;

    match transport.next().await {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(e)) => Err(e.into()),
        None => Err(ClientError::ConnectionLost),
    }
}

/// State shared between a session and the queue handles it opened
pub(crate) struct SessionInner {
    id: SessionId,
    transport: tokio::sync::Mutex<Option<Transport>>,
    open_handles: Mutex<HashSet<HandleId>>,
    request_timeout: Duration,
}

impl SessionInner {
    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send one request and wait for its reply.
    ///
    /// Any transport failure or missed deadline leaves the stream in an
    /// unknown position, so the connection is dropped and the session closed.
    pub(crate) async fn request(&self, message: Message, deadline: Duration) -> Result<Message> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(ClientError::SessionClosed)?;

        let outcome = tokio::time::timeout(deadline, exchange(transport, message)).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(ClientError::Timeout(deadline))
            }
        }
    }

    pub(crate) fn forget_handle(&self, handle: HandleId) {
        self.open_handles.lock().remove(&handle);
    }

    async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }
}

/// One authenticated connection to a queue manager.
///
/// Handles opened from a session stay bound to it; once the session is
/// disconnected every operation on them fails with [`ClientError::SessionClosed`].
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    fn new(id: SessionId, transport: Transport, request_timeout: Duration) -> Self {
        Session {
            inner: Arc::new(SessionInner {
                id,
                transport: tokio::sync::Mutex::new(Some(transport)),
                open_handles: Mutex::new(HashSet::new()),
                request_timeout,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    /// Number of handles opened and not yet closed
    pub fn open_handle_count(&self) -> usize {
        self.inner.open_handles.lock().len()
    }

    /// Open a queue in the given mode
    pub async fn open(&self, queue: &str, mode: OpenMode) -> Result<QueueHandle> {
        let request = Message::Open(OpenRequest {
            queue: queue.to_string(),
            mode,
        });

        match self.inner.request(request, self.inner.request_timeout).await? {
            Message::Opened(handle) => {
                self.inner.open_handles.lock().insert(handle);
                debug!("Opened {} for {} as handle {}", queue, mode, handle);
                Ok(QueueHandle::new(self.inner.clone(), handle, queue.to_string(), mode))
            }
            Message::Failure(failure) => Err(ClientError::Open {
                queue: queue.to_string(),
                reason: failure.reason,
                detail: failure.detail,
            }),
            other => Err(ClientError::UnexpectedReply(other.message_type())),
        }
    }

    /// Close remaining handles and end the session.
    ///
    /// Handle close failures are logged and do not stop the disconnect.
    pub async fn disconnect(self) -> Result<()> {
        let handles: Vec<HandleId> = self.inner.open_handles.lock().drain().collect();

        for handle in handles {
            if let Err(e) = self
                .inner
                .request(Message::Close(handle), self.inner.request_timeout)
                .await
            {
                debug!("Implicit close of handle {} failed: {}", handle, e);
            }
        }

        let result = match self
            .inner
            .request(Message::Disconnect, self.inner.request_timeout)
            .await
        {
            Ok(Message::Closed) | Err(ClientError::SessionClosed) => Ok(()),
            Ok(other) => Err(ClientError::UnexpectedReply(other.message_type())),
            Err(e) => Err(e),
        };

        *self.inner.transport.lock().await = None;
        info!("Session {} disconnected", self.inner.id);

        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.inner.id).finish()
    }
}
