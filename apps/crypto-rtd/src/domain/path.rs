//! Data paths.
//!
//! A [`Path`] is the join key between stream fan-out writes and registry
//! lookups. The textual format is part of the external contract:
//!
//! ```text
//! ORIGIN/VENDOR/INSTRUMENT/FIELD
//! ORIGIN/VENDOR/INSTRUMENT/FIELD/INDEX
//! ```
//!
//! All segments are upper-cased. The vendor segment is normally empty, so a
//! typical path reads `BINANCE//ETHUSDT/ASK`.

use std::fmt;

/// Path of the clock heartbeat topic.
pub const CLOCK_PATH: &str = "CLOCK";

/// Normalized composite key identifying one logical data point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    /// Build a path from its segments, normalizing case.
    #[must_use]
    pub fn new(origin: &str, vendor: &str, instrument: &str, field: &str, index: Option<u32>) -> Self {
        let mut formatted = format!(
            "{}/{}/{}/{}",
            origin.trim(),
            vendor.trim(),
            instrument.trim(),
            field.trim()
        );
        if let Some(index) = index {
            formatted.push('/');
            formatted.push_str(&index.to_string());
        }
        Self(formatted.to_uppercase())
    }

    /// The clock heartbeat path.
    #[must_use]
    pub fn clock() -> Self {
        Self(CLOCK_PATH.to_string())
    }

    /// The formatted path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_empty_vendor() {
        let path = Path::new("binance", "", "ethusdt", "ask", None);
        assert_eq!(path.as_str(), "BINANCE//ETHUSDT/ASK");
    }

    #[test]
    fn appends_index() {
        let path = Path::new("BINANCE_DEPTH", "", "ethusdt", "bid_depth", Some(3));
        assert_eq!(path.to_string(), "BINANCE_DEPTH//ETHUSDT/BID_DEPTH/3");
    }

    #[test]
    fn case_differences_collapse_to_one_key() {
        let a = Path::new("Binance", "", "EthUsdt", "Ask", None);
        let b = Path::new("BINANCE", "", "ETHUSDT", "ASK", None);
        assert_eq!(a, b);
    }

    #[test]
    fn clock_path() {
        assert_eq!(Path::clock().as_str(), "CLOCK");
    }
}
