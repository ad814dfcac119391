//! RTD Engine
//!
//! The consumer boundary. A consumer subscribes topics under ids it
//! chooses, wakes on a fixed cadence, checks [`RtdEngine::has_pending_changes`]
//! and drains changed values with [`RtdEngine::poll`].
//!
//! Nothing here returns an error to the consumer. Bad topics come back as
//! [`Value::Error`] text, unknown ids are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::multiplexer::{CacheHandle, InstrumentMultiplexer};
use super::snapshot::SnapshotExtractor;
use crate::application::ports::UpstreamSubscriber;
use crate::domain::path::Path;
use crate::domain::registry::{SubscriptionId, ValueRegistry};
use crate::domain::streaming::{FeedMessage, is_known_field};
use crate::domain::topic::TopicRequest;
use crate::domain::value::Value;
use crate::infrastructure::metrics;

/// Default row limit for trade history topics without an index.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Consumer-facing subscription and polling engine.
pub struct RtdEngine {
    registry: Arc<ValueRegistry>,
    multiplexer: Arc<InstrumentMultiplexer>,
    extractor: SnapshotExtractor,
    topics: Mutex<HashMap<SubscriptionId, CacheHandle>>,
    history_limit: u32,
}

impl std::fmt::Debug for RtdEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtdEngine")
            .field("subscriptions", &self.registry.len())
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl RtdEngine {
    /// Create an engine opening upstream streams through `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamSubscriber>, history_limit: u32) -> Self {
        let registry = Arc::new(ValueRegistry::new());
        let multiplexer = Arc::new(InstrumentMultiplexer::new(Arc::clone(&registry), upstream));
        Self {
            registry,
            multiplexer,
            extractor: SnapshotExtractor::default(),
            topics: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// The registry backing this engine.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ValueRegistry> {
        &self.registry
    }

    /// The multiplexer backing this engine.
    #[must_use]
    pub const fn multiplexer(&self) -> &Arc<InstrumentMultiplexer> {
        &self.multiplexer
    }

    /// Subscribe `id` to a parsed topic and return its initial value.
    ///
    /// Re-subscribing an id replaces its previous topic. A field the stream
    /// never carries is stored as [`Value::Unsupported`] and opens nothing
    /// upstream.
    pub fn subscribe(&self, id: SubscriptionId, request: &TopicRequest) -> Value {
        self.release_topic(id);

        let path = request.path(self.history_limit);
        let Some(key) = request.stream_key(self.history_limit) else {
            let now = Value::Timestamp(Utc::now());
            self.registry.subscribe_with_value(id, path, now.clone());
            metrics::set_active_subscriptions(self.registry.len());
            return now;
        };

        if !is_known_field(key.kind, key.exchange, &request.field) {
            tracing::debug!(id, path = %path, stream = %key, "Unsupported field");
            self.registry.subscribe_with_value(id, path, Value::Unsupported);
            metrics::set_active_subscriptions(self.registry.len());
            return Value::Unsupported;
        }

        tracing::debug!(id, path = %path, stream = %key, "Subscribing topic");
        self.registry.subscribe(id, path);
        let handle = self.multiplexer.ensure_subscribed(&key);

        let initial = self
            .extractor
            .coerce(self.multiplexer.decode(&handle, &request.field, request.level()));
        if !initial.is_uninitialized() {
            self.registry.seed(id, initial.clone());
        }

        self.topics.lock().insert(id, handle);
        metrics::set_active_subscriptions(self.registry.len());
        initial
    }

    /// Subscribe `id` from a raw argument list (`origin, instrument, field[, index]`).
    ///
    /// Unparseable topics are not registered; their error text is returned.
    pub fn subscribe_topic<S: AsRef<str>>(&self, id: SubscriptionId, args: &[S]) -> Value {
        match TopicRequest::parse(args) {
            Ok(request) => self.subscribe(id, &request),
            Err(e) => {
                tracing::warn!(id, error = %e, "Rejected topic");
                Value::error(e.to_string())
            }
        }
    }

    /// Remove `id`. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
        self.release_topic(id);
        metrics::set_active_subscriptions(self.registry.len());
    }

    fn release_topic(&self, id: SubscriptionId) {
        let previous = self.topics.lock().remove(&id);
        if let Some(handle) = previous {
            self.multiplexer.release(&handle);
        }
    }

    /// Changed `(id, value)` pairs since the previous poll.
    #[must_use]
    pub fn poll(&self) -> Vec<(SubscriptionId, Value)> {
        let drained = self.registry.drain_dirty();
        if !drained.is_empty() {
            metrics::record_updates_drained(drained.len());
        }
        self.extractor.extract(drained)
    }

    /// Whether a poll would return anything.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.registry.is_dirty()
    }

    /// Advance the clock topic if updates are pending. Returns whether the
    /// consumer should be notified.
    pub fn tick_clock(&self) -> bool {
        self.tick_clock_at(Utc::now())
    }

    /// [`RtdEngine::tick_clock`] with an explicit time.
    pub fn tick_clock_at(&self, now: DateTime<Utc>) -> bool {
        if !self.registry.is_dirty() {
            return false;
        }
        self.registry.set_by_path(&Path::clock(), &Value::Timestamp(now));
        true
    }

    /// Apply one decoded feed message.
    pub fn on_message(&self, message: FeedMessage) {
        self.multiplexer.on_message(message);
    }

    /// Apply feed messages from `events` until the channel closes or `cancel` fires.
    pub async fn run_dispatch(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<FeedMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(message) => self.on_message(message),
                    None => break,
                },
            }
        }
        tracing::debug!("Feed dispatch stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::streaming::{
        Exchange, FeedRecord, StreamKey, StreamKind, TradeRecord,
    };

    #[derive(Default)]
    struct CountingUpstream {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl UpstreamSubscriber for CountingUpstream {
        fn open(&self, _key: &StreamKey) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self, _key: &StreamKey) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine() -> (Arc<CountingUpstream>, RtdEngine) {
        let upstream = Arc::new(CountingUpstream::default());
        let engine = RtdEngine::new(upstream.clone(), DEFAULT_HISTORY_LIMIT);
        (upstream, engine)
    }

    fn trade(price: i64) -> FeedMessage {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        FeedMessage::Record {
            key: StreamKey::new(Exchange::Binance, "BTCUSDT", StreamKind::Trade),
            record: FeedRecord::Trade(TradeRecord {
                symbol: "BTCUSDT".to_string(),
                event_time: ts,
                trade_id: 1,
                price: Decimal::from(price),
                quantity: Decimal::ONE,
                first_id: 1,
                last_id: 1,
                trade_time: ts,
                buyer_is_maker: false,
                ignore: true,
            }),
        }
    }

    #[test]
    fn unsupported_origin_returns_error_text() {
        let (upstream, engine) = engine();
        let value = engine.subscribe_topic(1, &["KRAKEN", "XBTUSD", "ASK"]);

        assert_eq!(value, Value::error("Unsupported origin: KRAKEN"));
        assert!(engine.registry().is_empty());
        assert_eq!(upstream.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_field_is_unsupported_before_and_after_data() {
        let (upstream, engine) = engine();
        let early = engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "FOO"]);
        assert_eq!(early, Value::Unsupported);
        assert_eq!(upstream.opened.load(Ordering::SeqCst), 0);

        engine.subscribe_topic(2, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        engine.on_message(trade(10));
        assert_eq!(engine.poll(), vec![(2, Value::integer(10))]);
        assert_eq!(engine.registry().value(1), Some(Value::Unsupported));

        let late = engine.subscribe_topic(3, &["BINANCE_TRADE", "BTCUSDT", "FOO"]);
        assert_eq!(late, Value::Unsupported);

        engine.unsubscribe(1);
        engine.unsubscribe(3);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fields_on_one_stream_share_upstream() {
        let (upstream, engine) = engine();
        engine.subscribe_topic(1, &["BINANCE_TRADE", "btcusdt", "PRICE"]);
        engine.subscribe_topic(2, &["BINANCE_TRADE", "BTCUSDT", "QUANTITY"]);

        assert_eq!(upstream.opened.load(Ordering::SeqCst), 1);

        engine.on_message(trade(50_000));
        let mut polled = engine.poll();
        polled.sort_by_key(|(id, _)| *id);
        assert_eq!(
            polled,
            vec![(1, Value::integer(50_000)), (2, Value::integer(1))]
        );
    }

    #[test]
    fn late_subscriber_gets_cached_initial_value() {
        let (_upstream, engine) = engine();
        engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        engine.on_message(trade(42));
        let _ = engine.poll();

        let initial = engine.subscribe_topic(2, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        assert_eq!(initial, Value::integer(42));
        assert!(!engine.has_pending_changes());
    }

    #[test]
    fn unsubscribe_last_topic_closes_stream() {
        let (upstream, engine) = engine();
        engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        engine.subscribe_topic(2, &["BINANCE_TRADE", "BTCUSDT", "QUANTITY"]);

        engine.unsubscribe(1);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 0);
        engine.unsubscribe(2);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 1);

        engine.unsubscribe(99);
        engine.on_message(trade(1));
        assert!(engine.poll().is_empty());
    }

    #[test]
    fn resubscribe_releases_previous_stream() {
        let (upstream, engine) = engine();
        engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "ASK"]);

        assert_eq!(upstream.opened.load(Ordering::SeqCst), 2);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clock_ticks_only_while_dirty() {
        let (_upstream, engine) = engine();
        let initial = engine.subscribe_topic(7, &["CLOCK"]);
        assert!(matches!(initial, Value::Timestamp(_)));

        let now = DateTime::from_timestamp_millis(1_800_000_000_000).unwrap();
        assert!(!engine.tick_clock_at(now));

        engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);
        engine.on_message(trade(3));
        assert!(engine.tick_clock_at(now));

        let polled = engine.poll();
        assert!(polled.contains(&(7, Value::Timestamp(now))));
        assert!(!engine.has_pending_changes());
    }

    #[tokio::test]
    async fn dispatch_applies_channel_messages() {
        let (_upstream, engine) = engine();
        let engine = Arc::new(engine);
        engine.subscribe_topic(1, &["BINANCE_TRADE", "BTCUSDT", "PRICE"]);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&engine).run_dispatch(rx, cancel.clone()));

        tx.send(trade(9)).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(engine.poll(), vec![(1, Value::integer(9))]);
    }
}
