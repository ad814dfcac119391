#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Crypto RTD - Real-Time Market Data Engine
//!
//! Keeps resilient WebSocket sessions to exchange feeds (Binance, GDAX),
//! multiplexes many field subscriptions onto one upstream stream per
//! instrument, and hands a polling consumer only the values that changed
//! since its previous poll.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Values, paths, topics, stream identity and the registry
//!   - `registry`: id/path/value store with dirty tracking
//!   - `streaming`: stream keys, session states and decoded records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: transports, session protocols, upstream and snapshot clients
//!   - `services`: multiplexer, snapshot extraction and the engine
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feeds`: WebSocket sessions, exchange codecs, REST snapshots
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──┐                  ┌──────────────┐     ┌──────────┐
//!              ├─► FeedMessage ──►│ Multiplexer  │────►│ Registry │──► poll()
//! GDAX WS ─────┤     channel      │ (cache slots)│     │ (dirty)  │
//! Binance REST ┘                  └──────────────┘     └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::path::Path;
pub use domain::registry::{RegistryStats, SubscriptionId, ValueRegistry};
pub use domain::streaming::{ConnectionState, Exchange, FeedMessage, FeedRecord, StreamKey, StreamKind};
pub use domain::topic::{Origin, TopicError, TopicRequest};
pub use domain::value::Value;

// Application services
pub use application::services::{
    CacheHandle, DEFAULT_HISTORY_LIMIT, InstrumentMultiplexer, RtdEngine, SnapshotExtractor,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, RtdConfig};

// Feeds
pub use infrastructure::feeds::{FeedRouter, FeedStatus, SessionConfig, StreamSession};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
