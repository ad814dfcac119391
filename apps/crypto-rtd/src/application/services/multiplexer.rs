//! Instrument Multiplexer
//!
//! Deduplicates upstream streams: any number of field subscriptions on the
//! same [`StreamKey`] share one upstream subscription and one cache slot.
//!
//! # Design
//!
//! - A single `parking_lot::Mutex` guards the slot map. The presence check,
//!   the slot insert and the upstream `open` call happen under it, so
//!   concurrent [`InstrumentMultiplexer::ensure_subscribed`] calls for one key
//!   produce exactly one upstream call.
//! - Slots are reference counted. [`InstrumentMultiplexer::release`] closes
//!   the upstream stream when the last reference goes away.
//! - Every inbound record replaces the slot's snapshot and is fanned out into
//!   the registry as one batch while the slot lock is held.
//! - One-shot kinds (24h statistics, trade history) are re-requested on the
//!   next `ensure_subscribed` once their previous request has completed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::UpstreamSubscriber;
use crate::domain::registry::ValueRegistry;
use crate::domain::streaming::{FeedMessage, FeedRecord, StreamKey, known_fields};
use crate::domain::value::Value;
use crate::infrastructure::metrics;

/// Handle to a cache slot returned by [`InstrumentMultiplexer::ensure_subscribed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    key: StreamKey,
}

impl CacheHandle {
    /// Stream behind this handle.
    #[must_use]
    pub const fn key(&self) -> &StreamKey {
        &self.key
    }
}

#[derive(Debug, Default)]
enum Snapshot {
    #[default]
    Empty,
    Ready(FeedRecord),
    Failed(String),
}

#[derive(Debug, Default)]
struct CacheSlot {
    refs: usize,
    in_flight: bool,
    snapshot: Snapshot,
}

impl CacheSlot {
    fn previous_depth(&self) -> usize {
        match &self.snapshot {
            Snapshot::Ready(record) => record.depth_len(),
            Snapshot::Empty | Snapshot::Failed(_) => 0,
        }
    }
}

/// Shares upstream streams and decode caches between field subscriptions.
pub struct InstrumentMultiplexer {
    registry: Arc<ValueRegistry>,
    upstream: Arc<dyn UpstreamSubscriber>,
    slots: Mutex<HashMap<StreamKey, CacheSlot>>,
}

impl std::fmt::Debug for InstrumentMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentMultiplexer")
            .field("streams", &self.active_streams())
            .finish_non_exhaustive()
    }
}

impl InstrumentMultiplexer {
    /// Create a multiplexer writing into `registry` and opening streams via `upstream`.
    #[must_use]
    pub fn new(registry: Arc<ValueRegistry>, upstream: Arc<dyn UpstreamSubscriber>) -> Self {
        Self {
            registry,
            upstream,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the slot for `key`, opening the upstream stream if needed.
    pub fn ensure_subscribed(&self, key: &StreamKey) -> CacheHandle {
        let mut slots = self.slots.lock();

        let open = match slots.get_mut(key) {
            Some(slot) => {
                slot.refs += 1;
                let refresh = key.kind.is_one_shot() && !slot.in_flight;
                if refresh {
                    slot.in_flight = true;
                }
                refresh
            }
            None => {
                slots.insert(
                    key.clone(),
                    CacheSlot {
                        refs: 1,
                        in_flight: key.kind.is_one_shot(),
                        snapshot: Snapshot::Empty,
                    },
                );
                true
            }
        };

        if open {
            tracing::debug!(stream = %key, "Opening upstream stream");
            self.upstream.open(key);
        }
        metrics::set_active_streams(slots.len());

        CacheHandle { key: key.clone() }
    }

    /// Drop one reference to `handle`'s slot, closing the upstream stream at zero.
    pub fn release(&self, handle: &CacheHandle) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&handle.key) else {
            return;
        };

        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            slots.remove(&handle.key);
            tracing::debug!(stream = %handle.key, "Closing upstream stream");
            self.upstream.close(&handle.key);
        }
        metrics::set_active_streams(slots.len());
    }

    /// Decode `field` from the cached snapshot.
    ///
    /// Returns the uninitialized sentinel before the first record and for a
    /// released handle, the unsupported sentinel for unknown fields and the
    /// upstream error text for a failed one-shot request.
    #[must_use]
    pub fn decode(&self, handle: &CacheHandle, field: &str, level: Option<u32>) -> Value {
        let slots = self.slots.lock();
        match slots.get(&handle.key).map(|slot| &slot.snapshot) {
            Some(Snapshot::Ready(record)) => record.field(field, level),
            Some(Snapshot::Failed(message)) => Value::error(message.clone()),
            Some(Snapshot::Empty) | None => Value::Uninitialized,
        }
    }

    /// Apply one decoded message from a session or a one-shot request.
    pub fn on_message(&self, message: FeedMessage) {
        match message {
            FeedMessage::Record { key, record } => self.on_record(&key, record),
            FeedMessage::Failed { key, message } => self.on_failure(&key, message),
            FeedMessage::Notice(notice) => {
                tracing::warn!(notice = %notice, "Upstream notice");
            }
        }
    }

    fn on_record(&self, key: &StreamKey, record: FeedRecord) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            tracing::trace!(stream = %key, "Dropping record for inactive stream");
            return;
        };

        let writes = record.fan_out(key, slot.previous_depth());
        slot.snapshot = Snapshot::Ready(record);
        slot.in_flight = false;

        self.registry.set_many(writes);
    }

    fn on_failure(&self, key: &StreamKey, message: String) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };

        tracing::warn!(stream = %key, error = %message, "Upstream request failed");
        let error = Value::error(message.clone());
        let writes: Vec<_> = known_fields(key.kind, key.exchange)
            .iter()
            .map(|field| (key.path(field, None), error.clone()))
            .collect();
        slot.snapshot = Snapshot::Failed(message);
        slot.in_flight = false;

        self.registry.set_many(writes);
    }

    /// Whether `key` currently has a slot.
    #[must_use]
    pub fn is_active(&self, key: &StreamKey) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Number of active slots.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.slots.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::path::Path;
    use crate::domain::streaming::{DepthRecord, Exchange, Level, StreamKind};

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

    fn setup() -> (Arc<ValueRegistry>, Arc<CountingUpstream>, InstrumentMultiplexer) {
        let registry = Arc::new(ValueRegistry::new());
        let upstream = Arc::new(CountingUpstream::default());
        let mux = InstrumentMultiplexer::new(Arc::clone(&registry), upstream.clone());
        (registry, upstream, mux)
    }

    fn depth_key() -> StreamKey {
        StreamKey::new(Exchange::Binance, "ETHUSDT", StreamKind::Depth)
    }

    fn depth(levels: usize) -> FeedMessage {
        let level = |i: usize| Level {
            price: Decimal::from(100 - i64::try_from(i).unwrap()),
            quantity: Decimal::ONE,
        };
        FeedMessage::Record {
            key: depth_key(),
            record: FeedRecord::Depth(DepthRecord {
                symbol: "ETHUSDT".to_string(),
                last_update_id: 1,
                bids: (0..levels).map(level).collect(),
                asks: (0..levels).map(level).collect(),
            }),
        }
    }

    #[test]
    fn repeated_ensure_opens_once() {
        let (_registry, upstream, mux) = setup();
        let a = mux.ensure_subscribed(&depth_key());
        let b = mux.ensure_subscribed(&depth_key());

        assert_eq!(a, b);
        assert_eq!(upstream.opened.load(Ordering::SeqCst), 1);
        assert_eq!(mux.active_streams(), 1);
    }

    #[test]
    fn concurrent_ensure_opens_once() {
        let (_registry, upstream, mux) = setup();
        let mux = Arc::new(mux);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let mux = Arc::clone(&mux);
                thread::spawn(move || mux.ensure_subscribed(&depth_key()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(upstream.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_closes_at_zero_refs() {
        let (_registry, upstream, mux) = setup();
        let handle = mux.ensure_subscribed(&depth_key());
        mux.ensure_subscribed(&depth_key());

        mux.release(&handle);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 0);
        mux.release(&handle);
        assert_eq!(upstream.closed.load(Ordering::SeqCst), 1);
        assert!(!mux.is_active(&depth_key()));
    }

    #[test]
    fn decode_before_first_record_is_uninitialized() {
        let (_registry, _upstream, mux) = setup();
        let handle = mux.ensure_subscribed(&depth_key());
        assert_eq!(mux.decode(&handle, "BID_DEPTH", Some(0)), Value::Uninitialized);
    }

    #[test]
    fn decode_unknown_field_is_unsupported() {
        let (_registry, _upstream, mux) = setup();
        let handle = mux.ensure_subscribed(&depth_key());
        mux.on_message(depth(2));
        assert_eq!(mux.decode(&handle, "NOT_A_FIELD", Some(0)), Value::Unsupported);
    }

    #[test]
    fn record_fans_out_into_registry() {
        let (registry, _upstream, mux) = setup();
        registry.subscribe(1, Path::new("BINANCE_DEPTH", "", "ETHUSDT", "BID_DEPTH", Some(1)));
        mux.ensure_subscribed(&depth_key());

        mux.on_message(depth(3));

        assert_eq!(
            registry.drain_dirty(),
            vec![(1, Value::Number(Decimal::from_str("99").unwrap()))]
        );
    }

    #[test]
    fn shrinking_depth_resets_vanished_levels() {
        let (registry, _upstream, mux) = setup();
        registry.subscribe(1, Path::new("BINANCE_DEPTH", "", "ETHUSDT", "ASK_DEPTH", Some(2)));
        let handle = mux.ensure_subscribed(&depth_key());

        mux.on_message(depth(3));
        assert_eq!(registry.value(1), Some(Value::Number(Decimal::from(98))));

        mux.on_message(depth(1));
        assert_eq!(registry.value(1), Some(Value::Uninitialized));
        assert_eq!(mux.decode(&handle, "ASK_DEPTH", Some(2)), Value::Uninitialized);
    }

    #[test]
    fn record_for_inactive_stream_is_dropped() {
        let (registry, _upstream, mux) = setup();
        registry.subscribe(1, Path::new("BINANCE_DEPTH", "", "ETHUSDT", "BID_DEPTH", Some(0)));

        mux.on_message(depth(1));

        assert!(!registry.is_dirty());
    }

    #[test]
    fn one_shot_failure_writes_error_text() {
        let (registry, upstream, mux) = setup();
        let key = StreamKey::new(Exchange::Binance, "NOPE", StreamKind::Ticker24h);
        registry.subscribe(1, key.path("LAST", None));
        let handle = mux.ensure_subscribed(&key);

        mux.on_message(FeedMessage::Failed {
            key: key.clone(),
            message: "Invalid symbol.".to_string(),
        });

        assert_eq!(registry.value(1), Some(Value::error("Invalid symbol.")));
        assert_eq!(mux.decode(&handle, "LAST", None), Value::error("Invalid symbol."));

        // completed one-shot is refreshed on the next subscribe
        mux.ensure_subscribed(&key);
        assert_eq!(upstream.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn in_flight_one_shot_is_not_duplicated() {
        let (_registry, upstream, mux) = setup();
        let key = StreamKey::new(Exchange::Binance, "BTCUSDT", StreamKind::History).with_granularity(10);

        mux.ensure_subscribed(&key);
        mux.ensure_subscribed(&key);

        assert_eq!(upstream.opened.load(Ordering::SeqCst), 1);
    }
}
