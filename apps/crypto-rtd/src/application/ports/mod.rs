//! Port Interfaces
//!
//! Contracts between the application services and infrastructure adapters,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`] / [`Connection`]: a text-frame streaming connection
//!   (WebSocket in production, scripted in tests)
//! - [`SessionProtocol`]: how one exchange frames subscribe requests and
//!   decodes inbound frames
//! - [`UpstreamSubscriber`]: opens and closes upstream streams for the
//!   multiplexer
//! - [`SnapshotClient`]: one-shot requests (24h statistics, trade history)
//!
//! ## Callbacks
//!
//! - [`MessageHandler`]: receives every decoded message from a session

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::streaming::{FeedMessage, StreamKey, TickerRecord, TradeHistory};

// =============================================================================
// Transport
// =============================================================================

/// Transport failures. All of them are reconnect-worthy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established (DNS, TCP, TLS, handshake).
    #[error("connect failed: {0}")]
    Connect(String),
    /// Outbound frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
    /// Inbound read failed.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// An open text-frame connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one UTF-8 text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Receive the next text frame. `None` means the peer closed the stream.
    ///
    /// Keepalive frames are handled internally and never returned.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection, ignoring errors.
    async fn close(&mut self);
}

/// Factory for connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

// =============================================================================
// Session Protocol
// =============================================================================

/// Inbound frame decode errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Discriminator names a message type this codec does not know.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Stream name cannot be mapped to a stream key.
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    /// Frame is structurally invalid.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Exchange-specific framing used by a stream session.
pub trait SessionProtocol: Send + Sync {
    /// Control frame subscribing `keys`, or `None` when there is nothing to send.
    fn subscribe_frame(&self, keys: &[StreamKey]) -> Option<String>;

    /// Control frame unsubscribing `keys`, or `None` when there is nothing to send.
    fn unsubscribe_frame(&self, keys: &[StreamKey]) -> Option<String>;

    /// Decode one inbound text frame into zero or more messages.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the frame cannot be decoded.
    fn decode(&self, frame: &str) -> Result<Vec<FeedMessage>, CodecError>;
}

/// Failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Callback receiving decoded messages from a session.
pub type MessageHandler = Arc<dyn Fn(FeedMessage) -> Result<(), HandlerError> + Send + Sync>;

// =============================================================================
// Upstream
// =============================================================================

/// Opens and closes upstream streams on behalf of the multiplexer.
///
/// Both calls are made while the multiplexer holds its slot lock, so
/// implementations must not block.
pub trait UpstreamSubscriber: Send + Sync {
    /// Start delivering data for `key`.
    fn open(&self, key: &StreamKey);

    /// Stop delivering data for `key`.
    fn close(&self, key: &StreamKey);
}

/// One-shot request failures. The rendered text is what the consumer sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Exchange rejected the request.
    #[error("{message}")]
    Api {
        /// Exchange error code.
        code: i64,
        /// Exchange error message.
        message: String,
    },
    /// Non-success HTTP status without a structured error body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Request could not be sent or timed out.
    #[error("network error: {0}")]
    Network(String),
    /// Response body could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// One-shot market data requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    /// Rolling 24h statistics for `symbol`.
    async fn ticker_24h(&self, symbol: &str) -> Result<TickerRecord, UpstreamError>;

    /// The latest `limit` trades for `symbol`, oldest first.
    async fn trade_history(&self, symbol: &str, limit: u32) -> Result<TradeHistory, UpstreamError>;
}
