use crate::{config::BrokerConfig, metrics::BrokerMetrics, queue::MessageQueue, queue::QueueRegistry};
use primeq_protocol::{
    ConnectRequest, Envelope, GetRequest, HandleId, Message, MessageCodec, OpenMode, OpenRequest,
    PutRequest, ReasonCode, SessionId, MAX_PAYLOAD_SIZE,
};

use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Development queue manager: authenticates sessions and serves named
/// in-memory queues over the framed TCP protocol.
pub struct Broker {
    config: Arc<BrokerConfig>,
    queues: Arc<QueueRegistry>,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<Notify>,
}

/// Authenticated identity of a connection
struct SessionContext {
    id: SessionId,
    user: String,
    client_name: String,
}

struct OpenQueue {
    queue: Arc<MessageQueue>,
    mode: OpenMode,
}

/// Per-connection state; handles are only meaningful on the connection
/// that opened them
#[derive(Default)]
struct ConnectionState {
    session: Option<SessionContext>,
    handles: HashMap<HandleId, OpenQueue>,
    next_handle: HandleId,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> anyhow::Result<Self> {
        let queues = QueueRegistry::new(&config.queues);
        let metrics = BrokerMetrics::new()?;

        info!(
            "Queue manager {} hosting {} queues",
            config.queue_manager,
            config.queues.len()
        );

        Ok(Broker {
            config: Arc::new(config),
            queues: Arc::new(queues),
            metrics: Arc::new(metrics),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr).await?;

        info!("Broker listening on {}", listener.local_addr()?);

        self.serve(listener).await
    }

    /// Bind the configured address and serve in a background task.
    /// Returns the bound address, which matters when the port is 0.
    pub async fn start(self: Arc<Self>) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.listen_address()).await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = self.serve(listener).await {
                error!("Broker stopped: {}", e);
            }
        });

        Ok(addr)
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            let broker = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = broker.handle_connection(stream, peer).await {
                                    debug!("Connection {} ended with error: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);
        let mut state = ConnectionState::default();

        let result = self.serve_requests(&mut framed, &mut state, peer).await;
        self.end_session(state, peer);

        result
    }

    async fn serve_requests(
        &self,
        framed: &mut Framed<TcpStream, MessageCodec>,
        state: &mut ConnectionState,
        peer: SocketAddr,
    ) -> anyhow::Result<()> {
        while let Some(result) = framed.next().await {
            match result {
                Ok(Message::Disconnect) => {
                    framed.send(Message::Closed).await?;
                    break;
                }
                Ok(message) => {
                    let reply = self.handle_message(state, message).await;
                    framed.send(reply).await?;
                }
                Err(e) => {
                    warn!("Protocol error from {}: {}", peer, e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Release everything a connection owned, whether it ended cleanly or not
    fn end_session(&self, state: ConnectionState, peer: SocketAddr) {
        if let Some(session) = state.session {
            self.metrics.sessions_active.dec();
            info!(
                "Session {} ({}, user {}) from {} ended, released {} handles",
                session.id,
                session.client_name,
                session.user,
                peer,
                state.handles.len()
            );
        }
    }

    async fn handle_message(&self, state: &mut ConnectionState, message: Message) -> Message {
        match message {
            Message::Connect(req) => self.handle_connect(state, req),
            _ if state.session.is_none() => {
                Message::failure(ReasonCode::NotConnected, "Connect before issuing requests")
            }
            Message::Open(req) => self.handle_open(state, req),
            Message::Put(req) => self.handle_put(state, req),
            Message::Get(req) => self.handle_get(state, req).await,
            Message::Close(handle) => {
                if state.handles.remove(&handle).is_some() {
                    debug!("Closed handle {}", handle);
                }
                Message::Closed
            }
            other => Message::failure(
                ReasonCode::ProtocolViolation,
                format!("Unexpected request {:?}", other.message_type()),
            ),
        }
    }

    fn handle_connect(&self, state: &mut ConnectionState, req: ConnectRequest) -> Message {
        if state.session.is_some() {
            return Message::failure(ReasonCode::ProtocolViolation, "Session already established");
        }

        if let Err((reason, detail)) = self.authenticate(&req) {
            warn!(
                "Rejected connection from {} as {}: {}",
                req.client_name, req.user, detail
            );
            self.metrics.record_rejected(reason.as_str());
            return Message::failure(reason, detail);
        }

        let session_id = Uuid::new_v4();
        info!(
            "Session {} established for {} (user {}, channel {})",
            session_id, req.client_name, req.user, req.channel
        );

        state.session = Some(SessionContext {
            id: session_id,
            user: req.user,
            client_name: req.client_name,
        });
        self.metrics.sessions_active.inc();

        Message::Connected(session_id)
    }

    fn authenticate(&self, req: &ConnectRequest) -> Result<(), (ReasonCode, String)> {
        if req.queue_manager != self.config.queue_manager {
            return Err((
                ReasonCode::UnknownQueueManager,
                format!("Queue manager {} is not known", req.queue_manager),
            ));
        }

        if !self.config.channels.iter().any(|c| *c == req.channel) {
            return Err((
                ReasonCode::UnknownChannel,
                format!("Channel {} is not defined", req.channel),
            ));
        }

        let user = self
            .config
            .users
            .iter()
            .find(|u| u.name == req.user)
            .ok_or_else(|| {
                (
                    ReasonCode::NotAuthorized,
                    format!("User {} is not authorized", req.user),
                )
            })?;

        if let Some(expected) = &user.password {
            if req.password.as_deref() != Some(expected.as_str()) {
                return Err((
                    ReasonCode::NotAuthorized,
                    format!("Invalid credentials for {}", req.user),
                ));
            }
        }

        Ok(())
    }

    fn handle_open(&self, state: &mut ConnectionState, req: OpenRequest) -> Message {
        let Some(queue) = self.queues.get(&req.queue) else {
            return Message::failure(
                ReasonCode::UnknownQueue,
                format!("Queue {} does not exist", req.queue),
            );
        };

        state.next_handle += 1;
        let handle = state.next_handle;
        state.handles.insert(handle, OpenQueue { queue, mode: req.mode });

        debug!("Opened {} for {} as handle {}", req.queue, req.mode, handle);
        Message::Opened(handle)
    }

    fn handle_put(&self, state: &mut ConnectionState, req: PutRequest) -> Message {
        let open = match lookup(state, req.handle, true) {
            Ok(open) => open,
            Err(failure) => return failure,
        };

        if req.payload.len() > MAX_PAYLOAD_SIZE {
            return Message::failure(
                ReasonCode::ProtocolViolation,
                format!("Payload of {} bytes exceeds limit", req.payload.len()),
            );
        }

        let envelope = Envelope::new(req.payload);
        let message_id = envelope.message_id;

        match open.queue.put(envelope) {
            Ok(depth) => {
                self.metrics.record_put(open.queue.name(), depth);
                debug!("Put {} on {}", message_id, open.queue.name());
                Message::PutAck(message_id)
            }
            Err(e) => {
                warn!("{}", e);
                Message::failure(ReasonCode::QueueFull, e.to_string())
            }
        }
    }

    async fn handle_get(&self, state: &mut ConnectionState, req: GetRequest) -> Message {
        let queue = match lookup(state, req.handle, false) {
            Ok(open) => open.queue.clone(),
            Err(failure) => return failure,
        };

        let wait = Duration::from_millis(req.wait_ms.min(self.config.limits.max_wait_ms));

        match queue.get_wait(wait).await {
            Some(envelope) => {
                self.metrics.record_get(queue.name(), queue.depth());
                debug!("Delivered {} from {}", envelope.message_id, queue.name());
                Message::Delivered(envelope)
            }
            None => Message::NoMessage,
        }
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    pub fn queues(&self) -> Arc<QueueRegistry> {
        self.queues.clone()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

fn lookup(state: &ConnectionState, handle: HandleId, output: bool) -> Result<&OpenQueue, Message> {
    let open = state.handles.get(&handle).ok_or_else(|| {
        Message::failure(
            ReasonCode::InvalidHandle,
            format!("Handle {} is not open on this connection", handle),
        )
    })?;

    if output && !open.mode.allows_output() {
        return Err(Message::failure(
            ReasonCode::NotOpenForOutput,
            format!("{} is open for {}", open.queue.name(), open.mode),
        ));
    }
    if !output && !open.mode.allows_input() {
        return Err(Message::failure(
            ReasonCode::NotOpenForInput,
            format!("{} is open for {}", open.queue.name(), open.mode),
        ));
    }

    Ok(open)
}
