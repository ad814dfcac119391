//! Stream Session
//!
//! One long-lived streaming connection per exchange, kept alive across
//! failures and holding the set of streams the engine wants.
//!
//! # Design
//!
//! - The desired stream set lives behind a `parking_lot::Mutex` together with
//!   a `connected` flag. `subscribe`/`unsubscribe` only enqueue a live command
//!   while that flag is set, and the connection task flips it while draining
//!   stale commands under the same lock. A reconnect therefore replays each
//!   desired stream exactly once and never loses one added mid-reconnect.
//! - Any transport error, read timeout or run of undecodable frames moves the
//!   session to [`ConnectionState::Faulted`] and schedules a reconnect with
//!   exponential backoff. Only [`StreamSession::disconnect`] stops it.
//! - Handlers run inside `catch_unwind`; a failing handler is logged and
//!   counted but never tears down the connection.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Connecting -> Open -> Closing -> Idle
//!             ^          |
//!             |          v
//!             +------ Faulted
//! ```

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    Connection, MessageHandler, SessionProtocol, Transport, TransportError,
};
use crate::domain::streaming::{ConnectionState, Exchange, FeedMessage, StreamKey};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a connection attempt ended and a reconnect was scheduled.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No frame arrived within the read timeout.
    #[error("no frame received for {0:?}")]
    ReadTimeout(Duration),

    /// Peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Too many consecutive frames failed to decode.
    #[error("{0} consecutive frames failed to decode")]
    TooManyDecodeErrors(u32),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a stream session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Streaming endpoint.
    pub url: String,
    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectConfig,
    /// Reconnect when nothing arrives for this long.
    pub read_timeout: Duration,
    /// Reconnect after this many undecodable frames in a row (0 = never).
    pub max_consecutive_decode_errors: u32,
}

impl SessionConfig {
    /// Configuration for `url` with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            read_timeout: Duration::from_secs(90),
            max_consecutive_decode_errors: 16,
        }
    }
}

// =============================================================================
// Session Statistics
// =============================================================================

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Text frames received.
    pub frames: u64,
    /// Reconnects scheduled.
    pub reconnects: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    reconnects: AtomicU64,
    decode_errors: AtomicU64,
    handler_failures: AtomicU64,
}

// =============================================================================
// Stream Session
// =============================================================================

#[derive(Debug)]
enum Command {
    Subscribe(StreamKey),
    Unsubscribe(StreamKey),
}

#[derive(Debug, Default)]
struct DesiredState {
    keys: BTreeSet<StreamKey>,
    connected: bool,
}

enum Event {
    Cancelled,
    Command(Option<Command>),
    Frame(Result<Option<Result<String, TransportError>>, tokio::time::error::Elapsed>),
}

/// Self-healing streaming connection to one exchange.
pub struct StreamSession {
    exchange: Exchange,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    protocol: Arc<dyn SessionProtocol>,
    handler: MessageHandler,
    desired: Mutex<DesiredState>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("exchange", &self.exchange)
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Create an idle session. Nothing connects until [`StreamSession::start`].
    #[must_use]
    pub fn new(
        exchange: Exchange,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        protocol: Arc<dyn SessionProtocol>,
        handler: MessageHandler,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            exchange,
            config,
            transport,
            protocol,
            handler,
            desired: Mutex::new(DesiredState::default()),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            state_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Exchange this session connects to.
    #[must_use]
    pub const fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Spawn the connection task on the current runtime. Later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        let Some(commands) = self.command_rx.lock().take() else {
            return;
        };
        let handle = tokio::spawn(Arc::clone(self).run(commands));
        *self.task.lock() = Some(handle);
    }

    /// Add `key` to the desired set. Returns whether it was newly added.
    pub fn subscribe(&self, key: StreamKey) -> bool {
        let mut desired = self.desired.lock();
        if !desired.keys.insert(key.clone()) {
            return false;
        }
        if desired.connected {
            let _ = self.command_tx.send(Command::Subscribe(key));
        }
        true
    }

    /// Remove `key` from the desired set. Returns whether it was present.
    pub fn unsubscribe(&self, key: &StreamKey) -> bool {
        let mut desired = self.desired.lock();
        if !desired.keys.remove(key) {
            return false;
        }
        if desired.connected {
            let _ = self.command_tx.send(Command::Unsubscribe(key.clone()));
        }
        true
    }

    /// Snapshot of the desired stream set.
    #[must_use]
    pub fn desired(&self) -> Vec<StreamKey> {
        self.desired.lock().keys.iter().cloned().collect()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Wait until the session is open. Returns `false` if it stopped first.
    pub async fn wait_until_open(&self) -> bool {
        let mut rx = self.state_tx.subscribe();
        tokio::select! {
            () = self.cancel.cancelled() => false,
            opened = rx.wait_for(|state| *state == ConnectionState::Open) => opened.is_ok(),
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop reconnecting, close the connection and wait for the task to exit.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(exchange = %self.exchange, error = %e, "Session task failed");
        }
        self.set_state(ConnectionState::Idle);
    }

    // =========================================================================
    // Connection Task
    // =========================================================================

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        while !self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            let result = self.connect_and_run(&mut commands, &mut policy).await;
            self.desired.lock().connected = false;

            let Err(e) = result else {
                break;
            };

            self.set_state(ConnectionState::Faulted);
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            metrics::record_reconnect(self.exchange);

            let delay = policy.next_delay();
            tracing::warn!(
                exchange = %self.exchange,
                error = %e,
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Session connection lost, reconnecting"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Idle);
        tracing::info!(exchange = %self.exchange, "Session stopped");
    }

    async fn connect_and_run(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), SessionError> {
        tracing::info!(exchange = %self.exchange, url = %self.config.url, "Connecting");

        let mut conn = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            conn = self.transport.connect(&self.config.url) => conn?,
        };

        let replay: Vec<StreamKey> = {
            let mut desired = self.desired.lock();
            while commands.try_recv().is_ok() {}
            desired.connected = true;
            desired.keys.iter().cloned().collect()
        };
        if let Some(frame) = self.protocol.subscribe_frame(&replay) {
            conn.send(frame).await?;
        }

        policy.reset();
        self.set_state(ConnectionState::Open);
        tracing::info!(exchange = %self.exchange, streams = replay.len(), "Session open");

        let result = self.receive_loop(conn.as_mut(), commands).await;
        if result.is_ok() {
            self.set_state(ConnectionState::Closing);
        }
        conn.close().await;
        result
    }

    async fn receive_loop(
        &self,
        conn: &mut dyn Connection,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), SessionError> {
        let read_timeout = self.config.read_timeout;
        let mut consecutive_decode_errors = 0_u32;

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Event::Cancelled,
                command = commands.recv() => Event::Command(command),
                frame = tokio::time::timeout(read_timeout, conn.recv()) => Event::Frame(frame),
            };

            match event {
                Event::Cancelled | Event::Command(None) => return Ok(()),
                Event::Command(Some(command)) => {
                    if let Some(frame) = self.command_frame(&command) {
                        conn.send(frame).await?;
                    }
                }
                Event::Frame(Err(_)) => return Err(SessionError::ReadTimeout(read_timeout)),
                Event::Frame(Ok(None)) => return Err(SessionError::Closed),
                Event::Frame(Ok(Some(Err(e)))) => return Err(e.into()),
                Event::Frame(Ok(Some(Ok(text)))) => {
                    self.on_frame(&text, &mut consecutive_decode_errors)?;
                }
            }
        }
    }

    fn command_frame(&self, command: &Command) -> Option<String> {
        match command {
            Command::Subscribe(key) => {
                tracing::debug!(exchange = %self.exchange, stream = %key, "Subscribing");
                self.protocol.subscribe_frame(std::slice::from_ref(key))
            }
            Command::Unsubscribe(key) => {
                tracing::debug!(exchange = %self.exchange, stream = %key, "Unsubscribing");
                self.protocol.unsubscribe_frame(std::slice::from_ref(key))
            }
        }
    }

    fn on_frame(&self, text: &str, consecutive_errors: &mut u32) -> Result<(), SessionError> {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_received(self.exchange);

        match self.protocol.decode(text) {
            Ok(messages) => {
                *consecutive_errors = 0;
                for message in messages {
                    self.dispatch(message);
                }
                Ok(())
            }
            Err(e) => {
                *consecutive_errors += 1;
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_decode_error(self.exchange);
                tracing::warn!(
                    exchange = %self.exchange,
                    error = %e,
                    consecutive = *consecutive_errors,
                    "Dropping undecodable frame"
                );

                let limit = self.config.max_consecutive_decode_errors;
                if limit > 0 && *consecutive_errors >= limit {
                    return Err(SessionError::TooManyDecodeErrors(*consecutive_errors));
                }
                Ok(())
            }
        }
    }

    fn dispatch(&self, message: FeedMessage) {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.handler)(message)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "handler panicked".to_string(),
        };

        self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_handler_failure(self.exchange);
        tracing::error!(exchange = %self.exchange, error = %failure, "Message handler failed");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(
                exchange = %self.exchange,
                from = previous.as_str(),
                to = state.as_str(),
                "Session state changed"
            );
            metrics::set_session_state(self.exchange, state);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
