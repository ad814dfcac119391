//! Upstream Router
//!
//! [`UpstreamSubscriber`] implementation behind the multiplexer. Streaming
//! kinds go to the exchange's [`StreamSession`]; one-shot kinds spawn a REST
//! request whose outcome is sent down the same event channel the sessions
//! use. The engine's dispatcher drains that channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::binance::{BinanceProtocol, BinanceRestClient};
use super::gdax::GdaxProtocol;
use super::session::{SessionStats, StreamSession};
use super::transport::WebSocketTransport;
use crate::application::ports::{
    HandlerError, MessageHandler, SnapshotClient, Transport, UpstreamError, UpstreamSubscriber,
};
use crate::application::services::DEFAULT_HISTORY_LIMIT;
use crate::domain::streaming::{
    ConnectionState, Exchange, FeedMessage, FeedRecord, StreamKey, StreamKind,
};
use crate::infrastructure::config::RtdConfig;
use crate::infrastructure::metrics;

/// Point-in-time view of one exchange session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    /// Exchange.
    pub exchange: Exchange,
    /// Session state.
    pub state: ConnectionState,
    /// Number of streams the session should carry.
    pub streams: usize,
    /// Session counters.
    pub stats: SessionStats,
}

/// Routes upstream open/close requests to sessions and REST snapshots.
pub struct FeedRouter {
    sessions: BTreeMap<Exchange, Arc<StreamSession>>,
    snapshots: Arc<dyn SnapshotClient>,
    events: mpsc::UnboundedSender<FeedMessage>,
    runtime: Handle,
}

impl std::fmt::Debug for FeedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRouter")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FeedRouter {
    /// Create a router without sessions.
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn SnapshotClient>,
        events: mpsc::UnboundedSender<FeedMessage>,
        runtime: Handle,
    ) -> Self {
        Self {
            sessions: BTreeMap::new(),
            snapshots,
            events,
            runtime,
        }
    }

    /// Build the production router: Binance and GDAX WebSocket sessions plus
    /// the Binance REST client, all feeding `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST client cannot be built.
    pub fn from_config(
        config: &RtdConfig,
        events: mpsc::UnboundedSender<FeedMessage>,
        runtime: Handle,
    ) -> Result<Self, UpstreamError> {
        let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport);
        let handler = forwarding_handler(events.clone());

        let binance = StreamSession::new(
            Exchange::Binance,
            config.session_config(&config.endpoints.binance_ws_url),
            Arc::clone(&transport),
            Arc::new(BinanceProtocol::new(config.engine.depth_levels)),
            Arc::clone(&handler),
        );
        let gdax = StreamSession::new(
            Exchange::Gdax,
            config.session_config(&config.endpoints.gdax_ws_url),
            transport,
            Arc::new(GdaxProtocol::new()),
            handler,
        );

        let rest = BinanceRestClient::new(
            config.endpoints.binance_rest_url.clone(),
            config.credentials.as_ref().map(|c| c.api_key().to_string()),
            config.engine.request_timeout,
        )?;

        Ok(Self::new(Arc::new(rest), events, runtime)
            .with_session(Arc::new(binance))
            .with_session(Arc::new(gdax)))
    }

    /// Register the session serving its exchange, replacing any previous one.
    #[must_use]
    pub fn with_session(mut self, session: Arc<StreamSession>) -> Self {
        self.sessions.insert(session.exchange(), session);
        self
    }

    /// Session for `exchange`.
    #[must_use]
    pub fn session(&self, exchange: Exchange) -> Option<&Arc<StreamSession>> {
        self.sessions.get(&exchange)
    }

    /// Start every session.
    pub fn start(&self) {
        for session in self.sessions.values() {
            session.start();
        }
    }

    /// Disconnect every session and wait for them to stop.
    pub async fn shutdown(&self) {
        for session in self.sessions.values() {
            session.disconnect().await;
        }
    }

    /// Status of every session.
    #[must_use]
    pub fn feed_status(&self) -> Vec<FeedStatus> {
        self.sessions
            .values()
            .map(|session| FeedStatus {
                exchange: session.exchange(),
                state: session.state(),
                streams: session.desired().len(),
                stats: session.stats(),
            })
            .collect()
    }

    fn request_snapshot(&self, key: StreamKey) {
        let client = Arc::clone(&self.snapshots);
        let events = self.events.clone();

        self.runtime.spawn(async move {
            let kind = key.kind;
            let result = match kind {
                StreamKind::Ticker24h => client.ticker_24h(&key.symbol).await.map(FeedRecord::Ticker),
                StreamKind::History => client
                    .trade_history(&key.symbol, key.granularity.unwrap_or(DEFAULT_HISTORY_LIMIT))
                    .await
                    .map(FeedRecord::History),
                StreamKind::Ticker | StreamKind::Depth | StreamKind::Trade | StreamKind::Candle => {
                    return;
                }
            };
            metrics::record_snapshot_request(kind, result.is_ok());

            let message = match result {
                Ok(record) => FeedMessage::Record { key, record },
                Err(e) => {
                    tracing::warn!(stream = %key, error = %e, "Snapshot request failed");
                    FeedMessage::Failed {
                        key,
                        message: e.to_string(),
                    }
                }
            };
            if events.send(message).is_err() {
                tracing::debug!("Feed dispatcher stopped, dropping snapshot");
            }
        });
    }
}

impl UpstreamSubscriber for FeedRouter {
    fn open(&self, key: &StreamKey) {
        if key.kind.is_one_shot() {
            self.request_snapshot(key.clone());
            return;
        }

        match self.sessions.get(&key.exchange) {
            Some(session) => {
                session.subscribe(key.clone());
            }
            None => {
                let _ = self.events.send(FeedMessage::Failed {
                    key: key.clone(),
                    message: format!("No session for {}", key.exchange),
                });
            }
        }
    }

    fn close(&self, key: &StreamKey) {
        if key.kind.is_one_shot() {
            return;
        }
        if let Some(session) = self.sessions.get(&key.exchange) {
            session.unsubscribe(key);
        }
    }
}

/// Handler forwarding every session message into `events`.
#[must_use]
pub fn forwarding_handler(events: mpsc::UnboundedSender<FeedMessage>) -> MessageHandler {
    Arc::new(move |message| {
        events
            .send(message)
            .map_err(|_| HandlerError("feed dispatcher stopped".to_string()))
    })
}
