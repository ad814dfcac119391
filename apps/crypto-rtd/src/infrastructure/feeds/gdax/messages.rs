//! GDAX Wire Types
//!
//! Coinbase Exchange WebSocket feed messages. Every message carries a
//! `type` discriminator; only `ticker` carries market data.
//!
//! # References
//!
//! - [WebSocket Channels](https://docs.cdp.coinbase.com/exchange/docs/websocket-channels)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::ProductTickerRecord;

/// Subscribe/unsubscribe request.
///
/// # Wire Format (JSON)
/// ```json
/// {"type":"subscribe","product_ids":["BTC-USD"],"channels":["ticker"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRequest<'a> {
    /// `subscribe` or `unsubscribe`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Product ids, e.g. `BTC-USD`.
    pub product_ids: &'a [String],
    /// Channel names.
    pub channels: [&'static str; 1],
}

/// `ticker` channel message.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct TickerMessage {
    pub product_id: String,
    #[serde(default)]
    pub sequence: i64,
    pub price: Decimal,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub last_size: Option<Decimal>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub open_24h: Option<Decimal>,
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub trade_id: Option<i64>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl From<TickerMessage> for ProductTickerRecord {
    fn from(m: TickerMessage) -> Self {
        Self {
            product_id: m.product_id,
            sequence: m.sequence,
            price: m.price.normalize(),
            best_bid: m.best_bid.map(|d| d.normalize()),
            best_ask: m.best_ask.map(|d| d.normalize()),
            last_size: m.last_size.map(|d| d.normalize()),
            side: m.side,
            open_24h: m.open_24h.map(|d| d.normalize()),
            high_24h: m.high_24h.map(|d| d.normalize()),
            low_24h: m.low_24h.map(|d| d.normalize()),
            volume_24h: m.volume_24h.map(|d| d.normalize()),
            trade_id: m.trade_id,
            time: m.time,
        }
    }
}

/// `error` message.
///
/// # Wire Format (JSON)
/// ```json
/// {"type":"error","message":"Failed to subscribe","reason":"FOO-BAR is not a valid product"}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    /// Summary.
    pub message: String,
    /// Detail, when given.
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_with_optional_fields_missing() {
        let json = r#"{"type":"ticker","product_id":"BTC-USD","price":"42000.10"}"#;
        let record: ProductTickerRecord = serde_json::from_str::<TickerMessage>(json).unwrap().into();

        assert_eq!(record.product_id, "BTC-USD");
        assert_eq!(record.price.to_string(), "42000.1");
        assert_eq!(record.best_bid, None);
        assert_eq!(record.time, None);
    }

    #[test]
    fn channel_request_shape() {
        let products = vec!["BTC-USD".to_string()];
        let json = serde_json::to_string(&ChannelRequest {
            kind: "subscribe",
            product_ids: &products,
            channels: ["ticker"],
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"subscribe","product_ids":["BTC-USD"],"channels":["ticker"]}"#
        );
    }
}
