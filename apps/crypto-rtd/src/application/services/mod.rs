//! Application Services
//!
//! - [`InstrumentMultiplexer`]: one upstream stream and cache slot per stream key
//! - [`SnapshotExtractor`]: coerces drained values for the consumer
//! - [`RtdEngine`]: consumer boundary (subscribe, unsubscribe, poll)

mod engine;
mod multiplexer;
mod snapshot;

pub use engine::{DEFAULT_HISTORY_LIMIT, RtdEngine};
pub use multiplexer::{CacheHandle, InstrumentMultiplexer};
pub use snapshot::SnapshotExtractor;
