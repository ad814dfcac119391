//! Engine Configuration Settings
//!
//! Configuration types for the RTD engine, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::feeds::binance::DEPTH_LEVELS;
use crate::infrastructure::feeds::{ReconnectConfig, SessionConfig};

/// Binance API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: Option<String>,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: Option<String>) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Exchange endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Binance combined-stream WebSocket URL.
    pub binance_ws_url: String,
    /// Binance REST base URL.
    pub binance_rest_url: String,
    /// GDAX WebSocket feed URL.
    pub gdax_ws_url: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            binance_ws_url: "wss://stream.binance.com:9443/stream".to_string(),
            binance_rest_url: "https://api.binance.com".to_string(),
            gdax_ws_url: "wss://ws-feed.exchange.coinbase.com".to_string(),
        }
    }
}

/// Streaming session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Reconnect when nothing arrives for this long.
    pub read_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to each delay.
    pub reconnect_jitter: f64,
    /// Consecutive decode failures before a forced reconnect (0 = never).
    pub max_decode_errors: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(90),
            reconnect_delay_initial: Duration::from_millis(2000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.5,
            max_decode_errors: 16,
        }
    }
}

/// Engine behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Consumer wake cadence.
    pub poll_interval: Duration,
    /// REST request timeout.
    pub request_timeout: Duration,
    /// Partial book depth per side.
    pub depth_levels: u32,
    /// Default trade history row limit.
    pub history_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(33),
            request_timeout: Duration::from_secs(10),
            depth_levels: 10,
            history_limit: 100,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct RtdConfig {
    /// Optional Binance credentials.
    pub credentials: Option<Credentials>,
    /// Exchange endpoints.
    pub endpoints: EndpointSettings,
    /// Streaming session settings.
    pub session: SessionSettings,
    /// Engine settings.
    pub engine: EngineSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl Default for RtdConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            endpoints: EndpointSettings::default(),
            session: SessionSettings::default(),
            engine: EngineSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl RtdConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);
        let defaults = Self::default();

        let credentials = match (env.non_empty("BINANCE_API_KEY"), env.non_empty("BINANCE_SECRET")) {
            (Some(key), secret) => Some(Credentials::new(key, secret)),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("BINANCE_API_KEY".to_string())),
            (None, None) => None,
        };

        let endpoints = EndpointSettings {
            binance_ws_url: env
                .non_empty("BINANCE_WS_URL")
                .unwrap_or(defaults.endpoints.binance_ws_url),
            binance_rest_url: env
                .non_empty("BINANCE_REST_URL")
                .unwrap_or(defaults.endpoints.binance_rest_url),
            gdax_ws_url: env
                .non_empty("GDAX_WS_URL")
                .unwrap_or(defaults.endpoints.gdax_ws_url),
        };

        let session = SessionSettings {
            read_timeout: env.duration_secs("RTD_READ_TIMEOUT_SECS", defaults.session.read_timeout),
            reconnect_delay_initial: env.duration_millis(
                "RTD_RECONNECT_DELAY_INITIAL_MS",
                defaults.session.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "RTD_RECONNECT_DELAY_MAX_SECS",
                defaults.session.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.f64(
                "RTD_RECONNECT_DELAY_MULTIPLIER",
                defaults.session.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env.f64("RTD_RECONNECT_JITTER", defaults.session.reconnect_jitter),
            max_decode_errors: env.u32("RTD_MAX_DECODE_ERRORS", defaults.session.max_decode_errors),
        };

        let depth_levels = env.u32("RTD_DEPTH_LEVELS", defaults.engine.depth_levels);
        if !DEPTH_LEVELS.contains(&depth_levels) {
            return Err(ConfigError::InvalidValue {
                key: "RTD_DEPTH_LEVELS".to_string(),
                reason: format!("{depth_levels} is not one of {DEPTH_LEVELS:?}"),
            });
        }

        let engine = EngineSettings {
            poll_interval: env.duration_millis("RTD_POLL_INTERVAL_MS", defaults.engine.poll_interval),
            request_timeout: env.duration_secs(
                "RTD_REQUEST_TIMEOUT_SECS",
                defaults.engine.request_timeout,
            ),
            depth_levels,
            history_limit: env.u32("RTD_HISTORY_LIMIT", defaults.engine.history_limit),
        };

        let server = ServerSettings {
            health_port: env.u16("RTD_HEALTH_PORT", defaults.server.health_port),
        };

        Ok(Self {
            credentials,
            endpoints,
            session,
            engine,
            server,
        })
    }

    /// Backoff configuration for stream sessions.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.session.reconnect_delay_initial,
            max_delay: self.session.reconnect_delay_max,
            multiplier: self.session.reconnect_delay_multiplier,
            jitter_factor: self.session.reconnect_jitter,
        }
    }

    /// Session configuration for `url`.
    #[must_use]
    pub fn session_config(&self, url: &str) -> SessionConfig {
        SessionConfig {
            url: url.to_string(),
            reconnect: self.reconnect_config(),
            read_timeout: self.session.read_timeout,
            max_consecutive_decode_errors: self.session.max_decode_errors,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.non_empty(key).and_then(|v| v.parse().ok())
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.parse(key).unwrap_or(default)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.parse(key).unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}
