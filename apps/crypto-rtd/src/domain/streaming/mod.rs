//! Streaming Domain Types
//!
//! Identity of upstream streams ([`StreamKey`]), session lifecycle
//! ([`ConnectionState`]) and the decoded messages flowing from sessions into
//! the multiplexer ([`FeedMessage`]).

mod records;

use std::fmt;

pub use records::{
    CandleRecord, DepthRecord, FeedRecord, HistoricTrade, Level, ProductTickerRecord,
    TickerRecord, TradeHistory, TradeRecord, is_known_field, known_fields,
};

use super::path::Path;
use super::topic::Origin;

/// Exchange an upstream stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    /// Binance spot.
    Binance,
    /// GDAX (Coinbase Exchange).
    Gdax,
}

impl Exchange {
    /// Lower-case name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Gdax => "gdax",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    /// Rolling 24h ticker (streaming).
    Ticker,
    /// 24h statistics (one-shot request).
    Ticker24h,
    /// Partial order book (streaming).
    Depth,
    /// Aggregate trades (streaming).
    Trade,
    /// Klines; granularity is the interval ordinal (streaming).
    Candle,
    /// Trade history; granularity is the row limit (one-shot request).
    History,
}

impl StreamKind {
    /// Whether this kind is served by a single request instead of a stream.
    #[must_use]
    pub const fn is_one_shot(self) -> bool {
        matches!(self, Self::Ticker24h | Self::History)
    }

    /// Lower-case name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Ticker24h => "ticker_24h",
            Self::Depth => "depth",
            Self::Trade => "trade",
            Self::Candle => "candle",
            Self::History => "history",
        }
    }
}

/// Unit of upstream deduplication.
///
/// Many field subscriptions share one `StreamKey`; each key has at most one
/// upstream subscription and one cache slot at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Exchange serving the stream.
    pub exchange: Exchange,
    /// Instrument symbol, upper-cased.
    pub symbol: String,
    /// Stream kind.
    pub kind: StreamKind,
    /// Interval ordinal or row limit, when the kind needs one.
    pub granularity: Option<u32>,
}

impl StreamKey {
    /// Create a key without granularity.
    #[must_use]
    pub fn new(exchange: Exchange, symbol: &str, kind: StreamKind) -> Self {
        Self {
            exchange,
            symbol: symbol.trim().to_uppercase(),
            kind,
            granularity: None,
        }
    }

    /// Set the granularity.
    #[must_use]
    pub const fn with_granularity(mut self, granularity: u32) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Consumer origin that reads this stream.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        Origin::from_stream(self.exchange, self.kind)
    }

    /// Registry path for `field` on this stream.
    ///
    /// Keys with a granularity always carry it as the path index; `level` is
    /// only used by depth streams.
    #[must_use]
    pub fn path(&self, field: &str, level: Option<u32>) -> Path {
        Path::new(
            self.origin().as_str(),
            "",
            &self.symbol,
            field,
            self.granularity.or(level),
        )
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.symbol, self.kind.as_str())?;
        if let Some(granularity) = self.granularity {
            write!(f, ":{granularity}")?;
        }
        Ok(())
    }
}

/// Lifecycle of a streaming session.
///
/// `Idle -> Connecting -> Open -> Closing -> Idle`; `Faulted` always goes
/// back to `Connecting` after the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started or fully stopped.
    #[default]
    Idle,
    /// Transport connect in progress.
    Connecting,
    /// Connected and subscriptions replayed.
    Open,
    /// Shutdown requested.
    Closing,
    /// Connection lost, waiting for backoff.
    Faulted,
}

impl ConnectionState {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Faulted => "faulted",
        }
    }

    /// Numeric code for gauges.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
            Self::Faulted => 4,
        }
    }
}

/// Decoded message delivered to a session handler.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Fresh snapshot for a stream.
    Record {
        /// Stream the record belongs to.
        key: StreamKey,
        /// Decoded payload.
        record: FeedRecord,
    },
    /// Upstream request for a stream failed.
    Failed {
        /// Stream the failure belongs to.
        key: StreamKey,
        /// Human-readable error.
        message: String,
    },
    /// Upstream notice not tied to a stream (e.g. a rejected control frame).
    Notice(String),
}

/// Binance kline intervals, indexed by ordinal.
pub const KLINE_INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Interval name for an ordinal; unknown ordinals fall back to one minute.
#[must_use]
pub fn kline_interval(ordinal: u32) -> &'static str {
    usize::try_from(ordinal)
        .ok()
        .and_then(|i| KLINE_INTERVALS.get(i))
        .copied()
        .unwrap_or(KLINE_INTERVALS[0])
}

/// Ordinal for an interval name.
#[must_use]
pub fn kline_ordinal(interval: &str) -> Option<u32> {
    KLINE_INTERVALS
        .iter()
        .position(|candidate| *candidate == interval)
        .and_then(|i| u32::try_from(i).ok())
}
