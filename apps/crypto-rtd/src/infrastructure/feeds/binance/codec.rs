//! Binance Combined-Stream Protocol
//!
//! Maps stream keys to Binance stream names, frames `SUBSCRIBE`/`UNSUBSCRIBE`
//! requests and decodes `{"stream": ..., "data": ...}` envelopes.
//!
//! | Kind   | Stream name                 |
//! |--------|-----------------------------|
//! | Ticker | `<symbol>@ticker`           |
//! | Depth  | `<symbol>@depth<levels>`    |
//! | Trade  | `<symbol>@aggTrade`         |
//! | Candle | `<symbol>@kline_<interval>` |
//!
//! One-shot kinds have no stream name and are never framed.

use std::sync::atomic::{AtomicU64, Ordering};

use super::messages::{
    AggTradeEvent, ApiError, ControlRequest, KlineEvent, PartialDepthEvent, StreamEnvelope,
    TickerEvent,
};
use crate::application::ports::{CodecError, SessionProtocol};
use crate::domain::streaming::{
    Exchange, FeedMessage, FeedRecord, StreamKey, StreamKind, kline_interval, kline_ordinal,
};

/// Order book levels allowed by partial depth streams.
pub const DEPTH_LEVELS: [u32; 3] = [5, 10, 20];

/// Binance [`SessionProtocol`].
#[derive(Debug)]
pub struct BinanceProtocol {
    depth_levels: u32,
    next_id: AtomicU64,
}

impl Default for BinanceProtocol {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BinanceProtocol {
    /// Create a protocol subscribing `depth_levels` book levels per side.
    #[must_use]
    pub const fn new(depth_levels: u32) -> Self {
        Self {
            depth_levels,
            next_id: AtomicU64::new(1),
        }
    }

    /// Stream name for `key`, or `None` for one-shot kinds.
    #[must_use]
    pub fn stream_name(&self, key: &StreamKey) -> Option<String> {
        let symbol = key.symbol.to_lowercase();
        match key.kind {
            StreamKind::Ticker => Some(format!("{symbol}@ticker")),
            StreamKind::Depth => Some(format!("{symbol}@depth{}", self.depth_levels)),
            StreamKind::Trade => Some(format!("{symbol}@aggTrade")),
            StreamKind::Candle => Some(format!(
                "{symbol}@kline_{}",
                kline_interval(key.granularity.unwrap_or(0))
            )),
            StreamKind::Ticker24h | StreamKind::History => None,
        }
    }

    fn control_frame(&self, method: &'static str, keys: &[StreamKey]) -> Option<String> {
        let params: Vec<String> = keys.iter().filter_map(|key| self.stream_name(key)).collect();
        if params.is_empty() {
            return None;
        }

        let request = ControlRequest {
            method,
            params: &params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        serde_json::to_string(&request).ok()
    }

    fn decode_stream(envelope: StreamEnvelope) -> Result<Vec<FeedMessage>, CodecError> {
        let key = parse_stream_name(&envelope.stream)
            .ok_or_else(|| CodecError::UnknownStream(envelope.stream.clone()))?;

        let record = match key.kind {
            StreamKind::Ticker => {
                FeedRecord::Ticker(serde_json::from_value::<TickerEvent>(envelope.data)?.into())
            }
            StreamKind::Depth => FeedRecord::Depth(
                serde_json::from_value::<PartialDepthEvent>(envelope.data)?
                    .into_record(key.symbol.clone()),
            ),
            StreamKind::Trade => {
                FeedRecord::Trade(serde_json::from_value::<AggTradeEvent>(envelope.data)?.into())
            }
            StreamKind::Candle => {
                FeedRecord::Candle(serde_json::from_value::<KlineEvent>(envelope.data)?.into())
            }
            StreamKind::Ticker24h | StreamKind::History => {
                return Err(CodecError::UnknownStream(envelope.stream));
            }
        };

        Ok(vec![FeedMessage::Record { key, record }])
    }
}

impl SessionProtocol for BinanceProtocol {
    fn subscribe_frame(&self, keys: &[StreamKey]) -> Option<String> {
        self.control_frame("SUBSCRIBE", keys)
    }

    fn unsubscribe_frame(&self, keys: &[StreamKey]) -> Option<String> {
        self.control_frame("UNSUBSCRIBE", keys)
    }

    fn decode(&self, frame: &str) -> Result<Vec<FeedMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;

        if value.get("stream").is_some() {
            let envelope: StreamEnvelope = serde_json::from_value(value)?;
            return Self::decode_stream(envelope);
        }

        if let Some(error) = value.get("error") {
            let error: ApiError = serde_json::from_value(error.clone())?;
            return Ok(vec![FeedMessage::Notice(format!(
                "Binance error {}: {}",
                error.code, error.msg
            ))]);
        }

        // {"result":null,"id":1} acknowledges a control request
        if value.get("id").is_some() && value.get("result").is_some() {
            return Ok(Vec::new());
        }

        Err(CodecError::UnknownMessageType(
            frame.chars().take(50).collect(),
        ))
    }
}

/// Parse a combined-stream name back into its stream key.
#[must_use]
pub fn parse_stream_name(name: &str) -> Option<StreamKey> {
    let (symbol, stream) = name.split_once('@')?;
    if symbol.is_empty() {
        return None;
    }

    let key = if stream == "ticker" {
        StreamKey::new(Exchange::Binance, symbol, StreamKind::Ticker)
    } else if stream == "aggTrade" {
        StreamKey::new(Exchange::Binance, symbol, StreamKind::Trade)
    } else if stream.starts_with("depth") {
        StreamKey::new(Exchange::Binance, symbol, StreamKind::Depth)
    } else if let Some(interval) = stream.strip_prefix("kline_") {
        StreamKey::new(Exchange::Binance, symbol, StreamKind::Candle)
            .with_granularity(kline_ordinal(interval)?)
    } else {
        return None;
    };
    Some(key)
}
