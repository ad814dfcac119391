//! Consumer-visible values.
//!
//! Every registry entry holds a [`Value`]. Two of the variants are reserved
//! sentinels that consumers must treat as placeholders rather than errors:
//! [`Value::Uninitialized`] (no data has arrived yet) and
//! [`Value::Unsupported`] (the requested field does not exist for the stream).
//!
//! # Design
//!
//! Dirtiness is decided on *representation*, not on semantic equality:
//! `100.5` and `100.50` are different tokens and a write of one over the
//! other is a change. See [`Value::same_representation`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

/// Reserved token for a value that has not been received yet.
pub const UNINITIALIZED_TOKEN: &str = "<?>";

/// Reserved token for a field the stream does not carry.
pub const UNSUPPORTED_TOKEN: &str = "<!>";

/// A single data point as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// No data yet.
    #[default]
    Uninitialized,
    /// Unknown field for this stream kind.
    Unsupported,
    /// Free-form text.
    Text(String),
    /// Decimal number.
    Number(Decimal),
    /// Boolean flag.
    Boolean(bool),
    /// Point in time (UTC).
    Timestamp(DateTime<Utc>),
    /// Human-readable upstream or argument error.
    Error(String),
}

impl Value {
    /// Build a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Build an error value.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Build a number from an integer.
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }

    /// Whether this is the "no data yet" sentinel.
    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    /// Whether this is either sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Unsupported)
    }

    /// Whether two values render to the same token with the same type.
    ///
    /// This is the registry's change test: a write is only a change when the
    /// variant differs or the rendered text differs.
    #[must_use]
    pub fn same_representation(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uninitialized, Self::Uninitialized) | (Self::Unsupported, Self::Unsupported) => {
                true
            }
            (Self::Text(a), Self::Text(b)) | (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.to_string() == b.to_string(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str(UNINITIALIZED_TOKEN),
            Self::Unsupported => f.write_str(UNSUPPORTED_TOKEN),
            Self::Text(text) | Self::Error(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Boolean(flag) => f.write_str(if *flag { "TRUE" } else { "FALSE" }),
            Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn sentinels_render_reserved_tokens() {
        assert_eq!(Value::Uninitialized.to_string(), "<?>");
        assert_eq!(Value::Unsupported.to_string(), "<!>");
        assert!(Value::Unsupported.is_sentinel());
        assert!(!Value::text("<?>").is_sentinel());
    }

    #[test]
    fn same_number_token_is_same_representation() {
        let a = Value::Number(Decimal::from_str("100.5").unwrap());
        let b = Value::Number(Decimal::from_str("100.5").unwrap());
        assert!(a.same_representation(&b));
    }

    #[test]
    fn differently_scaled_numbers_are_different_tokens() {
        let a = Value::Number(Decimal::from_str("100.5").unwrap());
        let b = Value::Number(Decimal::from_str("100.50").unwrap());
        assert_eq!(a, b);
        assert!(!a.same_representation(&b));
    }

    #[test]
    fn type_change_is_a_change() {
        let number = Value::Number(Decimal::from(1));
        let text = Value::text("1");
        assert!(!number.same_representation(&text));
        assert!(!Value::text("x").same_representation(&Value::error("x")));
    }

    #[test]
    fn timestamp_renders_rfc3339_millis() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            Value::Timestamp(ts).to_string(),
            "2023-11-14T22:13:20.123Z"
        );
    }

    #[test]
    fn boolean_renders_upper_case() {
        assert_eq!(Value::from(true).to_string(), "TRUE");
        assert_eq!(Value::from(false).to_string(), "FALSE");
    }
}
