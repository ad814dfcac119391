//! Snapshot extraction.
//!
//! Turns the registry's drained dirty entries into consumer-ready values,
//! coercing each one into the richest type it plausibly represents:
//!
//! - numeric text becomes a decimal,
//! - integral numeric text inside the epoch-millisecond window becomes a
//!   timestamp,
//! - RFC 3339 text becomes a timestamp.
//!
//! Only text is coerced. Values already decoded into a typed variant pass
//! through, so large volumes and ids are never read as dates.
//! Coercion is best effort. Anything that does not fit is returned unchanged.

use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::registry::SubscriptionId;
use crate::domain::value::Value;

/// 2010-01-01T00:00:00Z in epoch milliseconds.
const EPOCH_MILLIS_MIN: i64 = 1_262_304_000_000;

/// 2100-01-01T00:00:00Z in epoch milliseconds.
const EPOCH_MILLIS_MAX: i64 = 4_102_444_800_000;

/// Converts drained registry entries into coerced consumer values.
#[derive(Debug, Clone)]
pub struct SnapshotExtractor {
    epoch_window: RangeInclusive<i64>,
}

impl Default for SnapshotExtractor {
    fn default() -> Self {
        Self::new(EPOCH_MILLIS_MIN..=EPOCH_MILLIS_MAX)
    }
}

impl SnapshotExtractor {
    /// Create an extractor treating integral text in `epoch_window` as epoch milliseconds.
    #[must_use]
    pub const fn new(epoch_window: RangeInclusive<i64>) -> Self {
        Self { epoch_window }
    }

    /// Coerce every entry, preserving order.
    #[must_use]
    pub fn extract(&self, drained: Vec<(SubscriptionId, Value)>) -> Vec<(SubscriptionId, Value)> {
        drained
            .into_iter()
            .map(|(id, value)| (id, self.coerce(value)))
            .collect()
    }

    /// Coerce a single value.
    #[must_use]
    pub fn coerce(&self, value: Value) -> Value {
        match value {
            Value::Text(text) => self.coerce_text(text),
            other => other,
        }
    }

    fn coerce_text(&self, text: String) -> Value {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Value::Text(text);
        }

        if let Ok(number) = Decimal::from_str(trimmed).or_else(|_| Decimal::from_scientific(trimmed)) {
            return self.number_or_epoch(number);
        }

        DateTime::parse_from_rfc3339(trimmed).map_or(Value::Text(text), |ts| {
            Value::Timestamp(ts.with_timezone(&Utc))
        })
    }

    fn number_or_epoch(&self, number: Decimal) -> Value {
        if number.fract().is_zero()
            && let Some(millis) = number.to_i64()
            && self.epoch_window.contains(&millis)
            && let Some(ts) = DateTime::from_timestamp_millis(millis)
        {
            return Value::Timestamp(ts);
        }
        Value::Number(number)
    }
}
