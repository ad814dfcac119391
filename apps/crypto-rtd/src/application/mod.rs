//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the services that drive the domain (multiplexing,
//! snapshot extraction, the consumer-facing engine) and the port interfaces
//! they need from infrastructure.

/// Port interfaces for transports, upstream subscriptions and snapshots.
pub mod ports;

/// Application services: multiplexer, snapshot extractor and engine.
pub mod services;
