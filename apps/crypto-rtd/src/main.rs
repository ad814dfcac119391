//! Crypto RTD Binary
//!
//! Starts the exchange sessions, subscribes a topic set and logs changed
//! values on every poll.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin crypto-rtd
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `RTD_TOPICS`: Topics separated by `;`, arguments by `,`
//!   (default: `BINANCE,ETHUSDT,ASK;BINANCE,ETHUSDT,BID;GDAX,BTC-USD,LAST_PRICE;CLOCK`)
//! - `BINANCE_API_KEY` / `BINANCE_SECRET`: Binance credentials (enables historical trades)
//! - `BINANCE_WS_URL`, `BINANCE_REST_URL`, `GDAX_WS_URL`: Exchange endpoints
//! - `RTD_POLL_INTERVAL_MS`: Poll cadence (default: 33)
//! - `RTD_DEPTH_LEVELS`: Binance partial depth levels, 5 | 10 | 20 (default: 10)
//! - `RTD_HISTORY_LIMIT`: Default trade history rows (default: 100)
//! - `RTD_READ_TIMEOUT_SECS`: Reconnect after this much silence (default: 90)
//! - `RTD_MAX_DECODE_ERRORS`: Consecutive bad frames before reconnecting (default: 16)
//! - `RTD_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use crypto_rtd::application::ports::UpstreamSubscriber;
use crypto_rtd::infrastructure::health::{HealthServer, HealthServerState};
use crypto_rtd::infrastructure::telemetry;
use crypto_rtd::{FeedRouter, RtdConfig, RtdEngine, SubscriptionId, init_metrics};
use tokio::runtime::Handle;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Topics subscribed when `RTD_TOPICS` is unset.
const DEFAULT_TOPICS: &str =
    "BINANCE,ETHUSDT,ASK;BINANCE,ETHUSDT,BID;GDAX,BTC-USD,LAST_PRICE;CLOCK";

/// Upper bound on waiting for sessions to close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Crypto RTD");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RtdConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let router = Arc::new(FeedRouter::from_config(&config, events_tx, Handle::current())?);
    let upstream: Arc<dyn UpstreamSubscriber> = router.clone();
    let engine = Arc::new(RtdEngine::new(upstream, config.engine.history_limit));

    tokio::spawn(Arc::clone(&engine).run_dispatch(events_rx, shutdown_token.clone()));
    router.start();

    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&router),
            Arc::clone(&engine),
        ));
        let health_server =
            HealthServer::new(config.server.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let topics = std::env::var("RTD_TOPICS").unwrap_or_else(|_| DEFAULT_TOPICS.to_string());
    let subscribed = subscribe_topics(&engine, &topics);
    tracing::info!(topics = subscribed.len(), "Crypto RTD ready");

    let poll_engine = Arc::clone(&engine);
    let poll_token = shutdown_token.clone();
    let poll_interval = config.engine.poll_interval;
    let poller = tokio::spawn(async move {
        run_poll_loop(&poll_engine, &subscribed, poll_interval, poll_token).await;
    });

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, router.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Sessions did not stop in time"
        );
    }
    let _ = poller.await;

    tracing::info!("Crypto RTD stopped");
    Ok(())
}

/// Split a topic list into argument vectors.
fn parse_topic_list(raw: &str) -> Vec<Vec<String>> {
    raw.split(';')
        .map(|topic| {
            topic
                .split(',')
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|args| !args.is_empty())
        .collect()
}

/// Subscribe every topic under sequential ids, returning id and label pairs.
fn subscribe_topics(engine: &RtdEngine, raw: &str) -> Vec<(SubscriptionId, String)> {
    let mut subscribed = Vec::new();
    for (id, args) in (1..).zip(parse_topic_list(raw)) {
        let label = args.join(",");
        let initial = engine.subscribe_topic(id, args.as_slice());
        tracing::info!(id, topic = %label, value = %initial, "Subscribed");
        subscribed.push((id, label));
    }
    subscribed
}

async fn run_poll_loop(
    engine: &RtdEngine,
    topics: &[(SubscriptionId, String)],
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !engine.tick_clock() {
                    continue;
                }
                for (id, value) in engine.poll() {
                    let topic = topics
                        .iter()
                        .find(|(topic_id, _)| *topic_id == id)
                        .map_or("?", |(_, label)| label.as_str());
                    tracing::info!(id, topic, value = %value, "Update");
                }
            }
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RtdConfig) {
    tracing::info!(
        poll_interval = ?config.engine.poll_interval,
        depth_levels = config.engine.depth_levels,
        history_limit = config.engine.history_limit,
        health_port = config.server.health_port,
        authenticated = config.credentials.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        binance_ws_url = %config.endpoints.binance_ws_url,
        binance_rest_url = %config.endpoints.binance_rest_url,
        gdax_ws_url = %config.endpoints.gdax_ws_url,
        "Exchange endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
