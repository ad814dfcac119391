//! Binance Wire Types
//!
//! Serde mappings for Binance combined-stream payloads and REST responses.
//! Field names follow Binance's single-letter keys; each payload converts
//! into the matching domain record.
//!
//! # References
//!
//! - [WebSocket Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)
//! - [Market Data Endpoints](https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{
    CandleRecord, DepthRecord, HistoricTrade, Level, TickerRecord, TradeRecord,
};

// =============================================================================
// Control Frames
// =============================================================================

/// Subscribe/unsubscribe request.
///
/// # Wire Format (JSON)
/// ```json
/// {"method":"SUBSCRIBE","params":["btcusdt@aggTrade"],"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest<'a> {
    /// `SUBSCRIBE` or `UNSUBSCRIBE`.
    pub method: &'static str,
    /// Stream names.
    pub params: &'a [String],
    /// Request id echoed in the response.
    pub id: u64,
}

/// Exchange error body, used by both the WebSocket API and REST.
///
/// # Wire Format (JSON)
/// ```json
/// {"code":-1121,"msg":"Invalid symbol."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub msg: String,
}

/// Envelope of every combined-stream data frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    /// Stream name, e.g. `btcusdt@aggTrade`.
    pub stream: String,
    /// Payload for that stream.
    pub data: serde_json::Value,
}

// =============================================================================
// Stream Payloads
// =============================================================================

/// `<symbol>@ticker` payload.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct TickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: Decimal,
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    #[serde(rename = "w")]
    pub weighted_avg_price: Decimal,
    #[serde(rename = "x")]
    pub prev_close: Decimal,
    #[serde(rename = "c")]
    pub last_price: Decimal,
    #[serde(rename = "Q")]
    pub last_qty: Decimal,
    #[serde(rename = "b")]
    pub bid_price: Decimal,
    #[serde(rename = "B")]
    pub bid_qty: Decimal,
    #[serde(rename = "a")]
    pub ask_price: Decimal,
    #[serde(rename = "A")]
    pub ask_qty: Decimal,
    #[serde(rename = "o")]
    pub open_price: Decimal,
    #[serde(rename = "h")]
    pub high_price: Decimal,
    #[serde(rename = "l")]
    pub low_price: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    #[serde(rename = "O", with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(rename = "C", with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "F")]
    pub first_id: i64,
    #[serde(rename = "L")]
    pub last_id: i64,
    #[serde(rename = "n")]
    pub trade_count: i64,
}

impl From<TickerEvent> for TickerRecord {
    fn from(e: TickerEvent) -> Self {
        Self {
            symbol: e.symbol,
            price_change: e.price_change.normalize(),
            price_change_percent: e.price_change_percent.normalize(),
            weighted_avg_price: e.weighted_avg_price.normalize(),
            prev_close: e.prev_close.normalize(),
            last_price: e.last_price.normalize(),
            last_qty: e.last_qty.normalize(),
            bid_price: e.bid_price.normalize(),
            bid_qty: e.bid_qty.normalize(),
            ask_price: e.ask_price.normalize(),
            ask_qty: e.ask_qty.normalize(),
            open_price: e.open_price.normalize(),
            high_price: e.high_price.normalize(),
            low_price: e.low_price.normalize(),
            volume: e.volume.normalize(),
            quote_volume: e.quote_volume.normalize(),
            open_time: e.open_time,
            close_time: e.close_time,
            first_id: e.first_id,
            last_id: e.last_id,
            trade_count: e.trade_count,
        }
    }
}

/// `<symbol>@depth<levels>` payload. The symbol only appears in the stream name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDepthEvent {
    /// Book update id.
    pub last_update_id: i64,
    /// `[price, quantity]` bid levels, best first.
    pub bids: Vec<(Decimal, Decimal)>,
    /// `[price, quantity]` ask levels, best first.
    pub asks: Vec<(Decimal, Decimal)>,
}

impl PartialDepthEvent {
    /// Convert into a record for `symbol`.
    #[must_use]
    pub fn into_record(self, symbol: String) -> DepthRecord {
        let levels = |side: Vec<(Decimal, Decimal)>| {
            side.into_iter()
                .map(|(price, quantity)| Level {
                    price: price.normalize(),
                    quantity: quantity.normalize(),
                })
                .collect()
        };
        DepthRecord {
            symbol,
            last_update_id: self.last_update_id,
            bids: levels(self.bids),
            asks: levels(self.asks),
        }
    }
}

/// `<symbol>@aggTrade` payload.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct AggTradeEvent {
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub trade_id: i64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "f")]
    pub first_id: i64,
    #[serde(rename = "l")]
    pub last_id: i64,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
    #[serde(rename = "M", default)]
    pub ignore: bool,
}

impl From<AggTradeEvent> for TradeRecord {
    fn from(e: AggTradeEvent) -> Self {
        Self {
            symbol: e.symbol,
            event_time: e.event_time,
            trade_id: e.trade_id,
            price: e.price.normalize(),
            quantity: e.quantity.normalize(),
            first_id: e.first_id,
            last_id: e.last_id,
            trade_time: e.trade_time,
            buyer_is_maker: e.buyer_is_maker,
            ignore: e.ignore,
        }
    }
}

/// `<symbol>@kline_<interval>` payload.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: Kline,
}

/// Kline body inside [`KlineEvent`].
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct Kline {
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_id: i64,
    #[serde(rename = "L")]
    pub last_id: i64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "n")]
    pub trades: i64,
    #[serde(rename = "x")]
    pub is_final: bool,
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    #[serde(rename = "V")]
    pub taker_buy_volume: Decimal,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

impl From<KlineEvent> for CandleRecord {
    fn from(e: KlineEvent) -> Self {
        let k = e.kline;
        Self {
            symbol: e.symbol,
            event: e.event,
            event_time: e.event_time,
            interval: k.interval,
            open_time: k.open_time,
            close_time: k.close_time,
            first_id: k.first_id,
            last_id: k.last_id,
            open: k.open.normalize(),
            high: k.high.normalize(),
            low: k.low.normalize(),
            close: k.close.normalize(),
            volume: k.volume.normalize(),
            quote_volume: k.quote_volume.normalize(),
            trades: k.trades,
            taker_buy_volume: k.taker_buy_volume.normalize(),
            taker_buy_quote_volume: k.taker_buy_quote_volume.normalize(),
            is_final: k.is_final,
        }
    }
}

// =============================================================================
// REST Responses
// =============================================================================

/// `GET /api/v3/ticker/24hr` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Ticker24hResponse {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub weighted_avg_price: Decimal,
    pub prev_close_price: Decimal,
    pub last_price: Decimal,
    pub last_qty: Decimal,
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub first_id: i64,
    pub last_id: i64,
    pub count: i64,
}

impl From<Ticker24hResponse> for TickerRecord {
    fn from(r: Ticker24hResponse) -> Self {
        Self {
            symbol: r.symbol,
            price_change: r.price_change.normalize(),
            price_change_percent: r.price_change_percent.normalize(),
            weighted_avg_price: r.weighted_avg_price.normalize(),
            prev_close: r.prev_close_price.normalize(),
            last_price: r.last_price.normalize(),
            last_qty: r.last_qty.normalize(),
            bid_price: r.bid_price.normalize(),
            bid_qty: r.bid_qty.normalize(),
            ask_price: r.ask_price.normalize(),
            ask_qty: r.ask_qty.normalize(),
            open_price: r.open_price.normalize(),
            high_price: r.high_price.normalize(),
            low_price: r.low_price.normalize(),
            volume: r.volume.normalize(),
            quote_volume: r.quote_volume.normalize(),
            open_time: r.open_time,
            close_time: r.close_time,
            first_id: r.first_id,
            last_id: r.last_id,
            trade_count: r.count,
        }
    }
}

/// One element of `GET /api/v3/trades` or `/api/v3/historicalTrades`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct TradeResponse {
    pub id: i64,
    pub price: Decimal,
    pub qty: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub is_buyer_maker: bool,
    pub is_best_match: bool,
}

impl From<TradeResponse> for HistoricTrade {
    fn from(r: TradeResponse) -> Self {
        Self {
            id: r.id,
            price: r.price.normalize(),
            quantity: r.qty.normalize(),
            time: r.time,
            buyer_is_maker: r.is_buyer_maker,
            best_match: r.is_best_match,
        }
    }
}
