//! End-to-end engine scenarios: exchange frames decoded by the real
//! protocols, applied to the engine, observed through `poll`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::sync::Arc;

use chrono::DateTime;
use crypto_rtd::application::ports::{SessionProtocol, UpstreamSubscriber};
use crypto_rtd::infrastructure::feeds::binance::BinanceProtocol;
use crypto_rtd::infrastructure::feeds::gdax::GdaxProtocol;
use crypto_rtd::{DEFAULT_HISTORY_LIMIT, FeedMessage, RtdEngine, StreamKey, Value};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Default)]
struct RecordingUpstream {
    opened: Mutex<Vec<StreamKey>>,
    closed: Mutex<Vec<StreamKey>>,
}

impl UpstreamSubscriber for RecordingUpstream {
    fn open(&self, key: &StreamKey) {
        self.opened.lock().push(key.clone());
    }

    fn close(&self, key: &StreamKey) {
        self.closed.lock().push(key.clone());
    }
}

fn engine() -> (Arc<RecordingUpstream>, RtdEngine) {
    let upstream = Arc::new(RecordingUpstream::default());
    let engine = RtdEngine::new(
        Arc::clone(&upstream) as Arc<dyn UpstreamSubscriber>,
        DEFAULT_HISTORY_LIMIT,
    );
    (upstream, engine)
}

fn num(raw: &str) -> Value {
    Value::Number(Decimal::from_str(raw).unwrap())
}

fn apply(engine: &RtdEngine, protocol: &dyn SessionProtocol, frame: &str) {
    for message in protocol.decode(frame).unwrap() {
        engine.on_message(message);
    }
}

fn ticker_frame(symbol: &str, bid: &str, ask: &str) -> String {
    format!(
        r#"{{"stream":"{lower}@ticker","data":{{"e":"24hrTicker","E":1700000000000,"s":"{symbol}","p":"1.5","P":"0.75","w":"100.2","x":"99.0","c":"100.4","Q":"0.3","b":"{bid}","B":"4","a":"{ask}","A":"2","o":"98.9","h":"102","l":"98","v":"1000","q":"100200","O":1699913600000,"C":1700000000000,"F":1,"L":500,"n":500}}}}"#,
        lower = symbol.to_lowercase(),
    )
}

fn depth_frame(update_id: i64, levels: usize) -> String {
    let side = |base: i64, step: i64| {
        (0..levels)
            .map(|i| {
                let offset = i64::try_from(i).unwrap() * step;
                format!(r#"["{}.0","{}"]"#, base + offset, i + 1)
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        r#"{{"stream":"ethusdt@depth10","data":{{"lastUpdateId":{update_id},"bids":[{}],"asks":[{}]}}}}"#,
        side(100, -1),
        side(101, 1),
    )
}

#[test]
fn ask_changes_are_reported_once_per_distinct_value() {
    let (upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    let initial = engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "ASK"]);
    assert_eq!(initial, Value::Uninitialized);
    assert_eq!(upstream.opened.lock().len(), 1);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100.4", "100.5"));
    assert!(engine.has_pending_changes());
    assert_eq!(engine.poll(), vec![(1, num("100.5"))]);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100.3", "100.5"));
    assert!(!engine.has_pending_changes());
    assert!(engine.poll().is_empty());

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100.3", "101.0"));
    assert_eq!(engine.poll(), vec![(1, num("101.0"))]);
    assert!(engine.poll().is_empty());
}

#[test]
fn depth_index_beyond_book_stays_uninitialized() {
    let (upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(2, &["BINANCE_DEPTH", "ETHUSDT", "BID_DEPTH", "0"]);
    engine.subscribe_topic(3, &["BINANCE_DEPTH", "ETHUSDT", "BID_DEPTH", "5"]);
    assert_eq!(upstream.opened.lock().len(), 1);

    for update in 1..=3 {
        apply(&engine, &protocol, &depth_frame(update, 3));
        let polled = engine.poll();
        assert!(polled.iter().all(|(id, _)| *id != 3), "{polled:?}");
        assert_eq!(engine.registry().value(3), Some(Value::Uninitialized));
    }
    assert_eq!(engine.registry().value(2), Some(num("100.0")));
}

#[test]
fn shrinking_book_resets_vanished_levels() {
    let (_upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(1, &["BINANCE_DEPTH", "ETHUSDT", "ASK_DEPTH", "2"]);
    engine.subscribe_topic(2, &["BINANCE_DEPTH", "ETHUSDT", "ASK_DEPTH_SIZE", "2"]);

    apply(&engine, &protocol, &depth_frame(1, 3));
    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);
    assert_eq!(polled, vec![(1, num("103.0")), (2, num("3"))]);

    apply(&engine, &protocol, &depth_frame(2, 2));
    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);
    assert_eq!(polled, vec![(1, Value::Uninitialized), (2, Value::Uninitialized)]);

    apply(&engine, &protocol, &depth_frame(3, 3));
    assert_eq!(engine.poll().len(), 2);
}

#[test]
fn two_ids_on_one_path_share_each_write() {
    let (upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(10, &["BINANCE", "ETHUSDT", "BID"]);
    engine.subscribe_topic(11, &["binance", " ethusdt ", "bid"]);
    assert_eq!(upstream.opened.lock().len(), 1);
    assert_eq!(engine.registry().stats().paths, 1);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "99.9", "100.1"));
    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);
    assert_eq!(polled, vec![(10, num("99.9")), (11, num("99.9"))]);
}

#[test]
fn derived_and_timestamp_fields() {
    let (_upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "SPREAD"]);
    engine.subscribe_topic(2, &["BINANCE", "ETHUSDT", "PRICE%"]);
    engine.subscribe_topic(3, &["BINANCE", "ETHUSDT", "CLOSE_TIME"]);
    engine.subscribe_topic(4, &["BINANCE", "ETHUSDT", "NOT_A_FIELD"]);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100", "100.25"));
    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);

    assert_eq!(polled[0], (1, num("0.25")));
    assert_eq!(polled[1], (2, num("0.0075")));
    assert_eq!(
        polled[2],
        (
            3,
            Value::Timestamp(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())
        )
    );
    assert_eq!(polled.len(), 3);
    assert_eq!(engine.registry().value(4), Some(Value::Unsupported));
}

#[test]
fn unknown_field_stays_unsupported_once_data_arrives() {
    let (upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    let early = engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "FOO"]);
    assert_eq!(early, Value::Unsupported);
    engine.subscribe_topic(2, &["BINANCE", "ETHUSDT", "ASK"]);
    assert_eq!(upstream.opened.lock().len(), 1);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100", "100.5"));
    assert_eq!(engine.poll(), vec![(2, num("100.5"))]);
    assert_eq!(engine.registry().value(1), Some(Value::Unsupported));

    let late = engine.subscribe_topic(3, &["BINANCE", "ETHUSDT", "FOO"]);
    assert_eq!(late, Value::Unsupported);
}

#[test]
fn large_volume_is_reported_as_number() {
    let (_upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(1, &["BINANCE", "SHIBUSDT", "VOL"]);
    let frame = ticker_frame("SHIBUSDT", "0.00001", "0.00002")
        .replace(r#""v":"1000""#, r#""v":"2500000000000.00""#);
    apply(&engine, &protocol, &frame);

    assert_eq!(engine.poll(), vec![(1, num("2500000000000.00"))]);
}

#[test]
fn close_reports_previous_close() {
    let (_upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "CLOSE"]);
    engine.subscribe_topic(2, &["BINANCE", "ETHUSDT", "LAST"]);
    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "100", "100.5"));

    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);
    assert_eq!(polled, vec![(1, num("99.0")), (2, num("100.4"))]);
}

#[test]
fn invalid_topics_return_error_text() {
    let (upstream, engine) = engine();

    assert_eq!(
        engine.subscribe_topic(1, &["NASDAQ", "AAPL", "LAST"]),
        Value::error("Unsupported origin: NASDAQ")
    );
    assert_eq!(
        engine.subscribe_topic(2, &["BINANCE", "ETHUSDT"]),
        Value::error("ERROR: Expected: origin, instrument, field, [index]")
    );
    assert!(engine.registry().is_empty());
    assert!(upstream.opened.lock().is_empty());
}

#[test]
fn gdax_ticker_feeds_last_price_and_clock() {
    let (upstream, engine) = engine();
    let protocol = GdaxProtocol::new();

    engine.subscribe_topic(1, &["GDAX", "BTC-USD", "LAST_PRICE"]);
    engine.subscribe_topic(2, &["GDAX", "BTC-USD", "BID"]);
    engine.subscribe_topic(9, &["CLOCK"]);
    assert_eq!(upstream.opened.lock().len(), 1);

    apply(
        &engine,
        &protocol,
        r#"{"type":"ticker","sequence":5,"product_id":"BTC-USD","price":"42000.50","side":"sell","time":"2024-01-02T03:04:05.678Z"}"#,
    );

    let now = DateTime::from_timestamp_millis(1_750_000_000_000).unwrap();
    assert!(engine.tick_clock_at(now));
    let mut polled = engine.poll();
    polled.sort_by_key(|(id, _)| *id);
    assert_eq!(
        polled,
        vec![(1, num("42000.50")), (9, Value::Timestamp(now))]
    );
    assert_eq!(engine.registry().value(2), Some(Value::Uninitialized));
    assert!(!engine.tick_clock_at(now));
}

#[test]
fn failed_one_shot_writes_error_and_refreshes() {
    let (upstream, engine) = engine();

    engine.subscribe_topic(1, &["BINANCE_24H", "NOPE", "LAST"]);
    let key = upstream.opened.lock()[0].clone();

    engine.on_message(FeedMessage::Failed {
        key,
        message: "Invalid symbol.".to_string(),
    });
    assert_eq!(engine.poll(), vec![(1, Value::error("Invalid symbol."))]);

    let again = engine.subscribe_topic(2, &["BINANCE_24H", "NOPE", "LAST"]);
    assert_eq!(again, Value::error("Invalid symbol."));
    assert_eq!(upstream.opened.lock().len(), 2);
}

#[test]
fn unsubscribing_last_field_closes_stream_and_drops_late_data() {
    let (upstream, engine) = engine();
    let protocol = BinanceProtocol::default();

    engine.subscribe_topic(1, &["BINANCE", "ETHUSDT", "ASK"]);
    engine.subscribe_topic(2, &["BINANCE", "ETHUSDT", "BID"]);
    engine.unsubscribe(1);
    assert!(upstream.closed.lock().is_empty());

    engine.unsubscribe(2);
    assert_eq!(upstream.closed.lock().len(), 1);
    assert_eq!(engine.multiplexer().active_streams(), 0);

    apply(&engine, &protocol, &ticker_frame("ETHUSDT", "1", "2"));
    assert!(!engine.has_pending_changes());
}
