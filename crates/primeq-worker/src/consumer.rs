use crate::config::ConsumerSettings;
use crate::handler::{PrimalityHandler, RecordHandler};
use crate::WorkerError;
use primeq_client::{publish_json, ConnectionManager, Envelope, OpenMode, QueueHandle, Session};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// Where the consumer is in its connect / poll / reply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    QueuesOpening,
    Polling,
    Processing,
    Posting,
    /// Receive fault; the loop has exited with an error
    Halted,
    /// Stop was requested and the session released
    Stopped,
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    empty_polls: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    publish_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub empty_polls: u64,
    pub processed: u64,
    pub dropped: u64,
    pub publish_failures: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A session together with the handles held for its whole lifetime
struct ActiveSession {
    session: Session,
    inbound: QueueHandle,
    outbound: QueueHandle,
}

/// Why polling ended without a receive fault
enum PollExit {
    Stopped,
    /// A failed reply took the connection down with it
    SessionLost,
}

/// Consumes work records from the inbound queue and posts verdicts to the
/// outbound queue.
///
/// Connecting is retried forever with a fixed delay, and so is reconnecting
/// after a failed reply closed the session. An empty receive is not an
/// error; any other receive failure ends [`run`](Self::run).
pub struct Consumer {
    manager: ConnectionManager,
    settings: ConsumerSettings,
    handler: Arc<dyn RecordHandler>,
    state: watch::Sender<ConsumerState>,
    stats: Arc<ConsumerStats>,
    stopping: AtomicBool,
    shutdown: Notify,
}

impl Consumer {
    pub fn new(manager: ConnectionManager, settings: ConsumerSettings) -> Self {
        let handler = Arc::new(PrimalityHandler::new(settings.rounds));
        let (state, _) = watch::channel(ConsumerState::Disconnected);

        Consumer {
            manager,
            settings,
            handler,
            state,
            stats: Arc::new(ConsumerStats::default()),
            stopping: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn RecordHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Ask the loop to stop.
    ///
    /// Takes effect at the next connect, retry wait or poll boundary; an
    /// in-flight receive is allowed to finish.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    /// Run until stopped or until a receive fault
    pub async fn run(&self) -> Result<(), WorkerError> {
        info!(
            "Consumer starting: {} -> {} via {}",
            self.settings.inbound_queue,
            self.settings.outbound_queue,
            self.manager.target()
        );

        let result = loop {
            let Some(session) = self.connect_until_ready().await else {
                break Ok(());
            };

            let mut active = match self.open_queues(session).await {
                Ok(active) => active,
                Err(e) => {
                    self.set_state(ConsumerState::Disconnected);
                    warn!("{}; retrying in {:?}", e, self.settings.retry_delay());
                    if !self.pause(self.settings.retry_delay()).await {
                        break Ok(());
                    }
                    continue;
                }
            };

            let outcome = self.poll(&mut active).await;
            self.release(active).await;

            match outcome {
                Ok(PollExit::Stopped) => break Ok(()),
                Ok(PollExit::SessionLost) => {
                    self.set_state(ConsumerState::Disconnected);
                    warn!(
                        "Session to {} lost; reconnecting in {:?}",
                        self.manager.target(),
                        self.settings.retry_delay()
                    );
                    if !self.pause(self.settings.retry_delay()).await {
                        break Ok(());
                    }
                }
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(()) => {
                self.set_state(ConsumerState::Stopped);
                info!("Consumer stopped");
            }
            Err(e) => {
                self.set_state(ConsumerState::Halted);
                error!("Consumer halted: {}", e);
            }
        }

        result
    }

    /// Connect, retrying after a fixed delay. `None` once a stop is requested.
    async fn connect_until_ready(&self) -> Option<Session> {
        loop {
            if self.is_stopping() {
                return None;
            }

            self.set_state(ConsumerState::Connecting);
            ConsumerStats::bump(&self.stats.connect_attempts);

            let attempt = tokio::select! {
                result = self.manager.connect() => result,
                _ = self.shutdown.notified() => return None,
            };

            match attempt {
                Ok(session) => return Some(session),
                Err(e) => {
                    ConsumerStats::bump(&self.stats.connect_failures);
                    self.set_state(ConsumerState::Disconnected);
                    warn!(
                        "Connect to {} failed: {}; retrying in {:?}",
                        self.manager.target(),
                        e,
                        self.settings.retry_delay()
                    );

                    if !self.pause(self.settings.retry_delay()).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep for `delay`; false if a stop arrived first
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_stopping(),
            _ = self.shutdown.notified() => false,
        }
    }

    /// Open both queues, tearing the session down if either fails
    async fn open_queues(&self, session: Session) -> Result<ActiveSession, WorkerError> {
        self.set_state(ConsumerState::QueuesOpening);

        let inbound = match session
            .open(&self.settings.inbound_queue, OpenMode::InputOutput)
            .await
        {
            Ok(handle) => handle,
            Err(source) => {
                self.abandon(session).await;
                return Err(WorkerError::Open {
                    queue: self.settings.inbound_queue.clone(),
                    source,
                });
            }
        };

        let outbound = match session
            .open(&self.settings.outbound_queue, OpenMode::Output)
            .await
        {
            Ok(handle) => handle,
            Err(source) => {
                self.abandon(session).await;
                return Err(WorkerError::Open {
                    queue: self.settings.outbound_queue.clone(),
                    source,
                });
            }
        };

        info!(
            "Listening on {} (session {})",
            self.settings.inbound_queue,
            session.id()
        );

        Ok(ActiveSession {
            session,
            inbound,
            outbound,
        })
    }

    async fn poll(&self, active: &mut ActiveSession) -> Result<PollExit, WorkerError> {
        let wait = self.settings.receive_wait();

        loop {
            if self.is_stopping() {
                return Ok(PollExit::Stopped);
            }

            self.set_state(ConsumerState::Polling);

            match active.inbound.receive(wait).await {
                Ok(None) => {
                    ConsumerStats::bump(&self.stats.empty_polls);
                    debug!("No message on {} within {:?}", self.settings.inbound_queue, wait);
                }
                Ok(Some(envelope)) => {
                    if !self.process(active, envelope).await {
                        return Ok(PollExit::SessionLost);
                    }
                }
                Err(source) => {
                    return Err(WorkerError::ReceiveFault {
                        queue: self.settings.inbound_queue.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Handle one message and post its verdict. False when posting the
    /// reply cost the session, so nothing more can be received on it.
    async fn process(&self, active: &ActiveSession, envelope: Envelope) -> bool {
        self.set_state(ConsumerState::Processing);

        let result = match self.handler.handle(&envelope.payload) {
            Ok(result) => result,
            Err(e) => {
                ConsumerStats::bump(&self.stats.dropped);
                warn!("Dropping message {}: {}", envelope.message_id, e);
                return true;
            }
        };
        ConsumerStats::bump(&self.stats.processed);

        self.set_state(ConsumerState::Posting);

        match publish_json(&active.outbound, &result).await {
            Ok(message_id) => info!(
                "Record {} ({}) prime = {}, posted as {}",
                result.id, result.value, result.prime, message_id
            ),
            Err(e) => {
                ConsumerStats::bump(&self.stats.publish_failures);
                error!("Failed to post result for record {}: {}", result.id, e);
                return active.session.is_connected().await;
            }
        }

        true
    }

    async fn release(&self, mut active: ActiveSession) {
        for handle in [&mut active.inbound, &mut active.outbound] {
            if let Err(e) = handle.close().await {
                debug!("Closing {} failed: {}", handle.queue(), e);
            }
        }
        self.abandon(active.session).await;
    }

    async fn abandon(&self, session: Session) {
        if let Err(e) = self.manager.disconnect(session).await {
            debug!("Disconnect failed: {}", e);
        }
    }
}
