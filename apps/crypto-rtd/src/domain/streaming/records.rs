//! Fixed-shape feed records.
//!
//! Each inbound message kind is decoded into one of these records before it
//! reaches the multiplexer. A record answers two questions:
//!
//! - [`FeedRecord::field`]: decode one field on demand (unknown field gives
//!   [`Value::Unsupported`], out-of-range level gives [`Value::Uninitialized`]).
//! - [`FeedRecord::fan_out`]: every known field as `(Path, Value)` writes for
//!   the registry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use super::StreamKey;
use crate::domain::fields;
use crate::domain::path::Path;
use crate::domain::value::Value;

/// One order-book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// Level price.
    pub price: Decimal,
    /// Level quantity.
    pub quantity: Decimal,
}

/// Rolling 24h ticker statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TickerRecord {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub weighted_avg_price: Decimal,
    pub prev_close: Decimal,
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
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub first_id: i64,
    pub last_id: i64,
    pub trade_count: i64,
}

/// GDAX ticker channel update.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ProductTickerRecord {
    pub product_id: String,
    pub sequence: i64,
    pub price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub last_size: Option<Decimal>,
    pub side: Option<String>,
    pub open_24h: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub trade_id: Option<i64>,
    pub time: Option<DateTime<Utc>>,
}

/// Partial order book snapshot, best level first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DepthRecord {
    pub symbol: String,
    pub last_update_id: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Aggregate trade.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TradeRecord {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    pub trade_id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub first_id: i64,
    pub last_id: i64,
    pub trade_time: DateTime<Utc>,
    pub buyer_is_maker: bool,
    pub ignore: bool,
}

/// Kline update.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CandleRecord {
    pub symbol: String,
    pub event: String,
    pub event_time: DateTime<Utc>,
    pub interval: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub first_id: i64,
    pub last_id: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades: i64,
    pub taker_buy_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
    pub is_final: bool,
}

/// One row of trade history.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct HistoricTrade {
    pub id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
    pub buyer_is_maker: bool,
    pub best_match: bool,
}

/// Trade history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TradeHistory {
    pub symbol: String,
    pub trades: Vec<HistoricTrade>,
}

/// A decoded payload for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRecord {
    /// Binance ticker (stream or 24h request).
    Ticker(TickerRecord),
    /// GDAX ticker.
    ProductTicker(ProductTickerRecord),
    /// Order book levels.
    Depth(DepthRecord),
    /// Aggregate trade.
    Trade(TradeRecord),
    /// Kline.
    Candle(CandleRecord),
    /// Trade history table.
    History(TradeHistory),
}

const TICKER_FIELDS: &[&str] = &[
    fields::FIRST_ID,
    fields::LAST_ID,
    fields::QUOTE_VOL,
    fields::VOL,
    fields::ASK,
    fields::ASK_SIZE,
    fields::BID,
    fields::BID_SIZE,
    fields::LOW,
    fields::HIGH,
    fields::VWAP,
    fields::PRICE_PCT,
    fields::PRICE_CHANGE,
    fields::TRADES,
    fields::SPREAD,
    fields::LAST,
    fields::LAST_SIZE,
    fields::OPEN,
    fields::OPEN_TIME,
    fields::CLOSE,
    fields::CLOSE_TIME,
    fields::PREV_CLOSE,
];

const PRODUCT_TICKER_FIELDS: &[&str] = &[
    fields::BID,
    fields::ASK,
    fields::LAST_PRICE,
    fields::LAST_SIZE,
    fields::LAST_SIDE,
    fields::HIGH_24H,
    fields::LOW_24H,
    fields::OPEN_24H,
    fields::VOLUME_24H,
    fields::TRADE_ID,
    fields::SEQUENCE,
    fields::TIME,
];

const DEPTH_LEVEL_FIELDS: &[&str] = &[
    fields::BID_DEPTH,
    fields::BID_DEPTH_SIZE,
    fields::ASK_DEPTH,
    fields::ASK_DEPTH_SIZE,
];

const TRADE_FIELDS: &[&str] = &[
    fields::TRADE_ID,
    fields::PRICE,
    fields::QUANTITY,
    fields::FIRST_ID,
    fields::LAST_ID,
    fields::TRADE_TIME,
    fields::BUYER_IS_MAKER,
    fields::IGNORE,
    fields::SYMBOL,
    fields::EVENT_TIME,
];

const CANDLE_FIELDS: &[&str] = &[
    fields::SYMBOL,
    fields::EVENT,
    fields::EVENT_TIME,
    fields::FIRST_ID,
    fields::LAST_ID,
    fields::HIGH,
    fields::LOW,
    fields::OPEN_TIME,
    fields::OPEN,
    fields::CLOSE_TIME,
    fields::CLOSE,
    fields::FINAL,
    fields::INTERVAL,
    fields::TRADES,
    fields::QUOTE_VOL,
    fields::VOL,
    fields::TAKE_BUY_VOL,
    fields::TAKE_BUY_QUOTE_VOL,
];

const HISTORY_FIELDS: &[&str] = &[
    fields::TRADES,
    fields::ID,
    fields::PRICE,
    fields::QUANTITY,
    fields::TIME,
    fields::BUYER_IS_MAKER,
    fields::BEST_MATCH,
];

/// Fields fanned out for a stream (per level for depth streams).
#[must_use]
pub const fn known_fields(kind: super::StreamKind, exchange: super::Exchange) -> &'static [&'static str] {
    use super::{Exchange, StreamKind};

    match (exchange, kind) {
        (Exchange::Gdax, _) => PRODUCT_TICKER_FIELDS,
        (Exchange::Binance, StreamKind::Ticker | StreamKind::Ticker24h) => TICKER_FIELDS,
        (Exchange::Binance, StreamKind::Depth) => DEPTH_LEVEL_FIELDS,
        (Exchange::Binance, StreamKind::Trade) => TRADE_FIELDS,
        (Exchange::Binance, StreamKind::Candle) => CANDLE_FIELDS,
        (Exchange::Binance, StreamKind::History) => HISTORY_FIELDS,
    }
}

/// Whether `field` (upper-case) decodes for the given stream.
#[must_use]
pub fn is_known_field(kind: super::StreamKind, exchange: super::Exchange, field: &str) -> bool {
    known_fields(kind, exchange).contains(&field)
        || (kind == super::StreamKind::Depth && field == fields::LAST_UPDATE_ID)
}

fn optional<T: Into<Value>>(value: Option<T>) -> Value {
    value.map_or(Value::Uninitialized, Into::into)
}

impl FeedRecord {
    /// Decode one field. `level` selects the order-book level for depth
    /// records and is ignored otherwise.
    #[must_use]
    pub fn field(&self, field: &str, level: Option<u32>) -> Value {
        let field = field.trim().to_uppercase();
        match self {
            Self::Ticker(t) => ticker_field(t, &field),
            Self::ProductTicker(t) => product_ticker_field(t, &field),
            Self::Depth(d) => depth_field(d, &field, level.unwrap_or(0)),
            Self::Trade(t) => trade_field(t, &field),
            Self::Candle(c) => candle_field(c, &field),
            Self::History(h) => history_field(h, &field),
        }
    }

    /// Number of levels on the longer side of a depth record, zero otherwise.
    #[must_use]
    pub fn depth_len(&self) -> usize {
        match self {
            Self::Depth(d) => d.bids.len().max(d.asks.len()),
            _ => 0,
        }
    }

    /// All known field writes for this record.
    ///
    /// For depth records every level up to `previous_depth` is written, so
    /// levels that disappeared since the previous snapshot fall back to the
    /// uninitialized sentinel.
    #[must_use]
    pub fn fan_out(&self, key: &StreamKey, previous_depth: usize) -> Vec<(Path, Value)> {
        match self {
            Self::Depth(d) => {
                let levels = self.depth_len().max(previous_depth);
                let mut writes = Vec::with_capacity(levels * DEPTH_LEVEL_FIELDS.len() + 1);
                writes.push((
                    key.path(fields::LAST_UPDATE_ID, None),
                    Value::integer(d.last_update_id),
                ));
                for level in 0..levels {
                    let Ok(level) = u32::try_from(level) else {
                        break;
                    };
                    for field in DEPTH_LEVEL_FIELDS {
                        writes.push((key.path(field, Some(level)), depth_field(d, field, level)));
                    }
                }
                writes
            }
            _ => known_fields(key.kind, key.exchange)
                .iter()
                .map(|field| (key.path(field, None), self.field(field, None)))
                .collect(),
        }
    }
}

fn ticker_field(t: &TickerRecord, field: &str) -> Value {
    match field {
        fields::FIRST_ID => Value::integer(t.first_id),
        fields::LAST_ID => Value::integer(t.last_id),
        fields::QUOTE_VOL => t.quote_volume.into(),
        fields::VOL => t.volume.into(),
        fields::ASK => t.ask_price.into(),
        fields::ASK_SIZE => t.ask_qty.into(),
        fields::BID => t.bid_price.into(),
        fields::BID_SIZE => t.bid_qty.into(),
        fields::LOW => t.low_price.into(),
        fields::HIGH => t.high_price.into(),
        fields::VWAP => t.weighted_avg_price.into(),
        fields::PRICE_PCT => (t.price_change_percent / Decimal::ONE_HUNDRED).normalize().into(),
        fields::PRICE_CHANGE => t.price_change.into(),
        fields::TRADES => Value::integer(t.trade_count),
        fields::SPREAD => (t.ask_price - t.bid_price).normalize().into(),
        fields::LAST => t.last_price.into(),
        fields::LAST_SIZE => t.last_qty.into(),
        fields::OPEN => t.open_price.into(),
        fields::OPEN_TIME => t.open_time.into(),
        fields::CLOSE => t.prev_close.into(),
        fields::CLOSE_TIME => t.close_time.into(),
        fields::PREV_CLOSE => t.prev_close.into(),
        _ => Value::Unsupported,
    }
}

fn product_ticker_field(t: &ProductTickerRecord, field: &str) -> Value {
    match field {
        fields::BID => optional(t.best_bid),
        fields::ASK => optional(t.best_ask),
        fields::LAST_PRICE => t.price.into(),
        fields::LAST_SIZE => optional(t.last_size),
        fields::LAST_SIDE => optional(t.side.clone()),
        fields::HIGH_24H => optional(t.high_24h),
        fields::LOW_24H => optional(t.low_24h),
        fields::OPEN_24H => optional(t.open_24h),
        fields::VOLUME_24H => optional(t.volume_24h),
        fields::TRADE_ID => t.trade_id.map_or(Value::Uninitialized, Value::integer),
        fields::SEQUENCE => Value::integer(t.sequence),
        fields::TIME => optional(t.time),
        _ => Value::Unsupported,
    }
}

fn depth_field(d: &DepthRecord, field: &str, level: u32) -> Value {
    let level = usize::try_from(level).unwrap_or(usize::MAX);
    match field {
        fields::LAST_UPDATE_ID => Value::integer(d.last_update_id),
        fields::BID_DEPTH => optional(d.bids.get(level).map(|l| l.price)),
        fields::BID_DEPTH_SIZE => optional(d.bids.get(level).map(|l| l.quantity)),
        fields::ASK_DEPTH => optional(d.asks.get(level).map(|l| l.price)),
        fields::ASK_DEPTH_SIZE => optional(d.asks.get(level).map(|l| l.quantity)),
        _ => Value::Unsupported,
    }
}

fn trade_field(t: &TradeRecord, field: &str) -> Value {
    match field {
        fields::TRADE_ID => Value::integer(t.trade_id),
        fields::PRICE => t.price.into(),
        fields::QUANTITY => t.quantity.into(),
        fields::FIRST_ID => Value::integer(t.first_id),
        fields::LAST_ID => Value::integer(t.last_id),
        fields::TRADE_TIME => t.trade_time.into(),
        fields::BUYER_IS_MAKER => t.buyer_is_maker.into(),
        fields::IGNORE => t.ignore.into(),
        fields::SYMBOL => Value::text(&t.symbol),
        fields::EVENT_TIME => t.event_time.into(),
        _ => Value::Unsupported,
    }
}

fn candle_field(c: &CandleRecord, field: &str) -> Value {
    match field {
        fields::SYMBOL => Value::text(&c.symbol),
        fields::EVENT => Value::text(&c.event),
        fields::EVENT_TIME => c.event_time.into(),
        fields::FIRST_ID => Value::integer(c.first_id),
        fields::LAST_ID => Value::integer(c.last_id),
        fields::HIGH => c.high.into(),
        fields::LOW => c.low.into(),
        fields::OPEN_TIME => c.open_time.into(),
        fields::OPEN => c.open.into(),
        fields::CLOSE_TIME => c.close_time.into(),
        fields::CLOSE => c.close.into(),
        fields::FINAL => c.is_final.into(),
        fields::INTERVAL => Value::text(&c.interval),
        fields::TRADES => Value::integer(c.trades),
        fields::QUOTE_VOL => c.quote_volume.into(),
        fields::VOL => c.volume.into(),
        fields::TAKE_BUY_VOL => c.taker_buy_volume.into(),
        fields::TAKE_BUY_QUOTE_VOL => c.taker_buy_quote_volume.into(),
        _ => Value::Unsupported,
    }
}

fn history_field(h: &TradeHistory, field: &str) -> Value {
    let column: Vec<serde_json::Value> = match field {
        fields::TRADES => {
            let mut table = Vec::with_capacity(h.trades.len() + 1);
            table.push(json!([
                fields::ID,
                fields::PRICE,
                fields::QUANTITY,
                fields::TIME,
                fields::BUYER_IS_MAKER,
                fields::BEST_MATCH
            ]));
            table.extend(h.trades.iter().map(|t| {
                json!([
                    t.id,
                    t.price.to_string(),
                    t.quantity.to_string(),
                    t.time.timestamp_millis(),
                    t.buyer_is_maker,
                    t.best_match
                ])
            }));
            table
        }
        fields::ID => h.trades.iter().map(|t| json!(t.id)).collect(),
        fields::PRICE => h.trades.iter().map(|t| json!(t.price.to_string())).collect(),
        fields::QUANTITY => h.trades.iter().map(|t| json!(t.quantity.to_string())).collect(),
        fields::TIME => h.trades.iter().map(|t| json!(t.time.timestamp_millis())).collect(),
        fields::BUYER_IS_MAKER => h.trades.iter().map(|t| json!(t.buyer_is_maker)).collect(),
        fields::BEST_MATCH => h.trades.iter().map(|t| json!(t.best_match)).collect(),
        _ => return Value::Unsupported,
    };
    Value::Text(serde_json::Value::Array(column).to_string())
}
