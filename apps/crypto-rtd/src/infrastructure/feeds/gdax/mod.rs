//! GDAX (Coinbase Exchange) Adapters
//!
//! Ticker channel protocol over the public WebSocket feed.

pub mod codec;
pub mod messages;

pub use codec::GdaxProtocol;
