//! Field names accepted in topic requests.
//!
//! Field names are compared upper-case; these constants are the canonical
//! spellings written into paths.

#![allow(missing_docs)]

pub const BID: &str = "BID";
pub const ASK: &str = "ASK";
pub const BID_SIZE: &str = "BID_SIZE";
pub const ASK_SIZE: &str = "ASK_SIZE";
pub const LAST: &str = "LAST";
pub const LAST_SIZE: &str = "LAST_SIZE";
pub const LAST_PRICE: &str = "LAST_PRICE";
pub const LAST_SIDE: &str = "LAST_SIDE";
pub const HIGH_24H: &str = "HIGH_24H";
pub const LOW_24H: &str = "LOW_24H";
pub const OPEN_24H: &str = "OPEN_24H";
pub const VOLUME_24H: &str = "VOLUME_24H";
pub const SEQUENCE: &str = "SEQUENCE";
pub const TIME: &str = "TIME";

pub const FIRST_ID: &str = "FIRST_ID";
pub const LAST_ID: &str = "LAST_ID";
pub const QUOTE_VOL: &str = "QUOTE_VOL";
pub const VOL: &str = "VOL";
pub const LOW: &str = "LOW";
pub const HIGH: &str = "HIGH";
pub const VWAP: &str = "VWAP";
pub const PRICE_PCT: &str = "PRICE%";
pub const PRICE_CHANGE: &str = "PRICE_CHANGE";
pub const TRADES: &str = "TRADES";
pub const SPREAD: &str = "SPREAD";
pub const OPEN: &str = "OPEN";
pub const OPEN_TIME: &str = "OPEN_TIME";
pub const CLOSE: &str = "CLOSE";
pub const CLOSE_TIME: &str = "CLOSE_TIME";
pub const PREV_CLOSE: &str = "PREV_CLOSE";

pub const BID_DEPTH: &str = "BID_DEPTH";
pub const BID_DEPTH_SIZE: &str = "BID_DEPTH_SIZE";
pub const ASK_DEPTH: &str = "ASK_DEPTH";
pub const ASK_DEPTH_SIZE: &str = "ASK_DEPTH_SIZE";
pub const LAST_UPDATE_ID: &str = "LAST_UPDATE_ID";

pub const TRADE_ID: &str = "TRADE_ID";
pub const PRICE: &str = "PRICE";
pub const QUANTITY: &str = "QUANTITY";
pub const TRADE_TIME: &str = "TRADE_TIME";
pub const BUYER_IS_MAKER: &str = "BUYER_IS_MAKER";
pub const IGNORE: &str = "IGNORE";
pub const SYMBOL: &str = "SYMBOL";
pub const EVENT_TIME: &str = "EVENT_TIME";

pub const EVENT: &str = "EVENT";
pub const FINAL: &str = "FINAL";
pub const INTERVAL: &str = "INTERVAL";
pub const TAKE_BUY_VOL: &str = "TAKE_BUY_VOL";
pub const TAKE_BUY_QUOTE_VOL: &str = "TAKE_BUY_QUOTE_VOL";

pub const ID: &str = "ID";
pub const BEST_MATCH: &str = "BEST_MATCH";
