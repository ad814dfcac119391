//! Exchange Feed Adapters
//!
//! - [`StreamSession`]: self-healing streaming connection per exchange
//! - [`WebSocketTransport`]: production [`Transport`](crate::application::ports::Transport)
//! - [`binance`] / [`gdax`]: exchange protocols and REST snapshots
//! - [`FeedRouter`]: opens and closes upstream streams for the multiplexer

pub mod binance;
pub mod gdax;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod transport;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use router::{FeedRouter, FeedStatus, forwarding_handler};
pub use session::{SessionConfig, SessionError, SessionStats, StreamSession};
pub use transport::WebSocketTransport;
