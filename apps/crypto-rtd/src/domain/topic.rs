//! Consumer topics.
//!
//! A consumer subscribes with a loose argument list
//! (`origin, instrument, field[, index]`, or just `CLOCK`). This module turns
//! that list into a [`TopicRequest`] and maps the request onto the
//! [`StreamKey`] it needs and the [`Path`] it is stored under.

use std::fmt;
use std::str::FromStr;

use super::path::Path;
use super::streaming::{Exchange, StreamKey, StreamKind, kline_interval, kline_ordinal};

/// Source of a topic, as named by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Heartbeat clock written while updates are pending.
    Clock,
    /// GDAX (Coinbase) ticker channel.
    Gdax,
    /// Binance rolling 24h ticker stream.
    Binance,
    /// Binance 24h statistics, fetched once per subscribe.
    Binance24h,
    /// Binance partial order book stream.
    BinanceDepth,
    /// Binance kline stream.
    BinanceCandle,
    /// Binance aggregate trade stream.
    BinanceTrade,
    /// Binance trade history, fetched once per subscribe.
    BinanceHistory,
}

/// How a topic's trailing index is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRole {
    /// The index is ignored.
    Unused,
    /// The index selects an order-book level.
    Level,
    /// The index is part of the stream identity (kline interval, history limit).
    Granularity,
}

impl Origin {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clock => "CLOCK",
            Self::Gdax => "GDAX",
            Self::Binance => "BINANCE",
            Self::Binance24h => "BINANCE_24H",
            Self::BinanceDepth => "BINANCE_DEPTH",
            Self::BinanceCandle => "BINANCE_CANDLE",
            Self::BinanceTrade => "BINANCE_TRADE",
            Self::BinanceHistory => "BINANCE_HISTORY",
        }
    }

    /// The upstream stream behind this origin, if any.
    #[must_use]
    pub const fn stream(self) -> Option<(Exchange, StreamKind)> {
        match self {
            Self::Clock => None,
            Self::Gdax => Some((Exchange::Gdax, StreamKind::Ticker)),
            Self::Binance => Some((Exchange::Binance, StreamKind::Ticker)),
            Self::Binance24h => Some((Exchange::Binance, StreamKind::Ticker24h)),
            Self::BinanceDepth => Some((Exchange::Binance, StreamKind::Depth)),
            Self::BinanceCandle => Some((Exchange::Binance, StreamKind::Candle)),
            Self::BinanceTrade => Some((Exchange::Binance, StreamKind::Trade)),
            Self::BinanceHistory => Some((Exchange::Binance, StreamKind::History)),
        }
    }

    /// Inverse of [`Origin::stream`].
    #[must_use]
    pub const fn from_stream(exchange: Exchange, kind: StreamKind) -> Self {
        match (exchange, kind) {
            (Exchange::Gdax, _) => Self::Gdax,
            (Exchange::Binance, StreamKind::Ticker) => Self::Binance,
            (Exchange::Binance, StreamKind::Ticker24h) => Self::Binance24h,
            (Exchange::Binance, StreamKind::Depth) => Self::BinanceDepth,
            (Exchange::Binance, StreamKind::Candle) => Self::BinanceCandle,
            (Exchange::Binance, StreamKind::Trade) => Self::BinanceTrade,
            (Exchange::Binance, StreamKind::History) => Self::BinanceHistory,
        }
    }

    /// How the topic index is used for this origin.
    #[must_use]
    pub const fn index_role(self) -> IndexRole {
        match self {
            Self::BinanceDepth => IndexRole::Level,
            Self::BinanceCandle | Self::BinanceHistory => IndexRole::Granularity,
            Self::Clock | Self::Gdax | Self::Binance | Self::Binance24h | Self::BinanceTrade => {
                IndexRole::Unused
            }
        }
    }
}

impl FromStr for Origin {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CLOCK" => Ok(Self::Clock),
            "GDAX" => Ok(Self::Gdax),
            "BINANCE" => Ok(Self::Binance),
            "BINANCE_24H" => Ok(Self::Binance24h),
            "BINANCE_DEPTH" => Ok(Self::BinanceDepth),
            "BINANCE_CANDLE" => Ok(Self::BinanceCandle),
            "BINANCE_TRADE" => Ok(Self::BinanceTrade),
            "BINANCE_HISTORY" => Ok(Self::BinanceHistory),
            _ => Err(TopicError::UnsupportedOrigin(s.to_string())),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed consumer subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRequest {
    /// Where the data comes from.
    pub origin: Origin,
    /// Instrument symbol (upper-cased).
    pub instrument: String,
    /// Field name (upper-cased).
    pub field: String,
    /// Optional trailing index.
    pub index: Option<u32>,
}

impl TopicRequest {
    /// Build a request from already separated parts.
    #[must_use]
    pub fn new(origin: Origin, instrument: &str, field: &str, index: Option<u32>) -> Self {
        Self {
            origin,
            instrument: instrument.trim().to_uppercase(),
            field: field.trim().to_uppercase(),
            index,
        }
    }

    /// The clock heartbeat topic.
    #[must_use]
    pub fn clock() -> Self {
        Self::new(Origin::Clock, "", "", None)
    }

    /// Parse a consumer argument list.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError::UnsupportedOrigin`] for an unknown origin and
    /// [`TopicError::Arity`] when the argument count does not fit.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, TopicError> {
        match args {
            [origin] => match origin.as_ref().parse::<Origin>()? {
                Origin::Clock => Ok(Self::clock()),
                _ => Err(TopicError::Arity(1)),
            },
            [origin, instrument, field, rest @ ..] => {
                let origin = origin.as_ref().parse::<Origin>()?;
                if origin == Origin::Clock {
                    return Ok(Self::clock());
                }
                let index = rest.first().and_then(|raw| raw.as_ref().trim().parse::<u32>().ok());
                Ok(Self::new(origin, instrument.as_ref(), field.as_ref(), index))
            }
            _ => Err(TopicError::Arity(args.len())),
        }
    }

    /// The upstream stream this topic reads from. `None` for the clock.
    #[must_use]
    pub fn stream_key(&self, default_history_limit: u32) -> Option<StreamKey> {
        let (exchange, kind) = self.origin.stream()?;
        let key = StreamKey::new(exchange, &self.instrument, kind);
        Some(match kind {
            StreamKind::Candle => {
                let ordinal = self.index.and_then(|i| kline_ordinal(kline_interval(i))).unwrap_or(0);
                key.with_granularity(ordinal)
            }
            StreamKind::History => key.with_granularity(self.index.unwrap_or(default_history_limit)),
            StreamKind::Ticker | StreamKind::Ticker24h | StreamKind::Depth | StreamKind::Trade => {
                key
            }
        })
    }

    /// Index handed to field decode (the order-book level for depth topics).
    #[must_use]
    pub fn level(&self) -> Option<u32> {
        match self.origin.index_role() {
            IndexRole::Level => Some(self.index.unwrap_or(0)),
            IndexRole::Unused | IndexRole::Granularity => None,
        }
    }

    /// Registry path for this topic.
    #[must_use]
    pub fn path(&self, default_history_limit: u32) -> Path {
        match self.stream_key(default_history_limit) {
            None => Path::clock(),
            Some(key) => key.path(&self.field, self.level()),
        }
    }
}

/// Topic parsing errors. The rendered text is what the consumer sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Origin is not one of the known feeds.
    #[error("Unsupported origin: {0}")]
    UnsupportedOrigin(String),
    /// Wrong number of arguments.
    #[error("ERROR: Expected: origin, instrument, field, [index]")]
    Arity(usize),
}
