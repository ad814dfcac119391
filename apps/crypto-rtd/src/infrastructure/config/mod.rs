//! Configuration Module
//!
//! Configuration loading for the RTD engine.

mod settings;

pub use settings::{
    ConfigError, Credentials, EndpointSettings, EngineSettings, RtdConfig, ServerSettings,
    SessionSettings,
};
