//! Binance Adapters
//!
//! - **Streams**: combined-stream WebSocket protocol (ticker, depth, trades, klines)
//! - **REST**: one-shot 24h statistics and trade history

pub mod codec;
pub mod messages;
pub mod rest;

pub use codec::{BinanceProtocol, DEPTH_LEVELS, parse_stream_name};
pub use rest::BinanceRestClient;
