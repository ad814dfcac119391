//! Domain Layer - Core data types and the value registry.
//!
//! Nothing in this layer performs I/O. Types here describe what a consumer
//! subscribes to ([`topic`], [`path`]), what it receives ([`value`]), how
//! upstream streams are identified and decoded ([`streaming`]) and where the
//! latest values live ([`registry`]).

/// Field-name constants.
pub mod fields;

/// Composite data paths.
pub mod path;

/// Id/path/value registry with dirty tracking.
pub mod registry;

/// Stream identity, lifecycle states and decoded feed records.
pub mod streaming;

/// Consumer topic parsing.
pub mod topic;

/// Consumer-visible values and sentinels.
pub mod value;
