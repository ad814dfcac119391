//! GDAX Ticker Protocol
//!
//! Subscribes the `ticker` channel per product and decodes ticker updates
//! into [`ProductTickerRecord`](crate::domain::streaming::ProductTickerRecord)s.
//! `subscriptions` and `heartbeat` messages carry no data and are skipped.

use super::messages::{ChannelRequest, ErrorMessage, TickerMessage};
use crate::application::ports::{CodecError, SessionProtocol};
use crate::domain::streaming::{Exchange, FeedMessage, FeedRecord, StreamKey, StreamKind};

const TICKER_CHANNEL: &str = "ticker";

/// GDAX [`SessionProtocol`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GdaxProtocol;

impl GdaxProtocol {
    /// Create a new protocol.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn channel_frame(kind: &'static str, keys: &[StreamKey]) -> Option<String> {
        let product_ids: Vec<String> = keys
            .iter()
            .filter(|key| key.exchange == Exchange::Gdax && key.kind == StreamKind::Ticker)
            .map(|key| key.symbol.clone())
            .collect();
        if product_ids.is_empty() {
            return None;
        }

        serde_json::to_string(&ChannelRequest {
            kind,
            product_ids: &product_ids,
            channels: [TICKER_CHANNEL],
        })
        .ok()
    }
}

impl SessionProtocol for GdaxProtocol {
    fn subscribe_frame(&self, keys: &[StreamKey]) -> Option<String> {
        Self::channel_frame("subscribe", keys)
    }

    fn unsubscribe_frame(&self, keys: &[StreamKey]) -> Option<String> {
        Self::channel_frame("unsubscribe", keys)
    }

    fn decode(&self, frame: &str) -> Result<Vec<FeedMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        let msg_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CodecError::InvalidFormat("missing type".to_string()))?;

        match msg_type {
            "ticker" => {
                let ticker: TickerMessage = serde_json::from_value(value)?;
                let key = StreamKey::new(Exchange::Gdax, &ticker.product_id, StreamKind::Ticker);
                Ok(vec![FeedMessage::Record {
                    key,
                    record: FeedRecord::ProductTicker(ticker.into()),
                }])
            }
            "subscriptions" | "heartbeat" => Ok(Vec::new()),
            "error" => {
                let error: ErrorMessage = serde_json::from_value(value)?;
                let notice = match error.reason {
                    Some(reason) => format!("GDAX error: {} ({reason})", error.message),
                    None => format!("GDAX error: {}", error.message),
                };
                Ok(vec![FeedMessage::Notice(notice)])
            }
            other => Err(CodecError::UnknownMessageType(other.to_string())),
        }
    }
}
