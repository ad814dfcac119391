//! Value Registry
//!
//! Maps caller-assigned subscription ids to paths, stores the latest value of
//! each subscription and tracks which ids changed since the last drain.
//!
//! # Design
//!
//! - One coarse `parking_lot::Mutex` guards the forward map, the reverse map
//!   and the dirty list, so a drain never interleaves with a write.
//! - Several ids may share one path; a path write updates all of them.
//! - The dirty list is ordered by first change since the last drain. Each
//!   subscription carries its own dirty flag so an id appears at most once.
//! - Writes against a path nobody subscribes to are dropped. This is how
//!   late stream data for cancelled subscriptions disappears.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::path::Path;
use super::value::Value;

/// Caller-assigned subscription identifier.
pub type SubscriptionId = i32;

#[derive(Debug)]
struct Subscription {
    path: Path,
    value: Value,
    dirty: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_id: HashMap<SubscriptionId, Subscription>,
    by_path: HashMap<Path, Vec<SubscriptionId>>,
    dirty: Vec<SubscriptionId>,
}

impl RegistryState {
    fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let subscription = self.by_id.remove(&id)?;

        if let Some(ids) = self.by_path.get_mut(&subscription.path) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_path.remove(&subscription.path);
            }
        }
        if subscription.dirty {
            self.dirty.retain(|other| *other != id);
        }

        Some(subscription)
    }

    fn write(&mut self, id: SubscriptionId, value: &Value) -> bool {
        let Some(subscription) = self.by_id.get_mut(&id) else {
            return false;
        };
        if subscription.value.same_representation(value) {
            return false;
        }

        subscription.value = value.clone();
        if !subscription.dirty {
            subscription.dirty = true;
            self.dirty.push(id);
        }
        true
    }

    fn write_path(&mut self, path: &Path, value: &Value) -> usize {
        let Some(ids) = self.by_path.get(path) else {
            return 0;
        };
        let ids = ids.clone();
        ids.into_iter().filter(|id| self.write(*id, value)).count()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered subscription ids.
    pub subscriptions: usize,
    /// Distinct paths.
    pub paths: usize,
    /// Ids changed since the last drain.
    pub dirty: usize,
}

/// Thread-safe id/path/value registry with dirty tracking.
#[derive(Debug, Default)]
pub struct ValueRegistry {
    state: Mutex<RegistryState>,
}

impl ValueRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` under `path` with the uninitialized sentinel.
    ///
    /// Re-subscribing an id replaces its previous mapping. The new entry is
    /// not dirty.
    pub fn subscribe(&self, id: SubscriptionId, path: Path) {
        self.subscribe_with_value(id, path, Value::Uninitialized);
    }

    /// Register `id` under `path` with a known initial value, not dirty.
    pub fn subscribe_with_value(&self, id: SubscriptionId, path: Path, value: Value) {
        let mut state = self.state.lock();
        if state.remove(id).is_some() {
            tracing::debug!(id, path = %path, "Replacing existing subscription");
        }

        state.by_path.entry(path.clone()).or_default().push(id);
        state.by_id.insert(
            id,
            Subscription {
                path,
                value,
                dirty: false,
            },
        );
    }

    /// Remove `id`. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().remove(id);
    }

    /// Write `value` to every subscription on `path`.
    ///
    /// Returns the number of subscriptions that changed.
    pub fn set_by_path(&self, path: &Path, value: &Value) -> usize {
        self.state.lock().write_path(path, value)
    }

    /// Write `value` to a single subscription. Returns whether it changed.
    pub fn set_by_id(&self, id: SubscriptionId, value: &Value) -> bool {
        self.state.lock().write(id, value)
    }

    /// Apply a batch of path writes under one lock acquisition.
    ///
    /// A drain running concurrently sees either none or all of the batch.
    pub fn set_many<I>(&self, writes: I) -> usize
    where
        I: IntoIterator<Item = (Path, Value)>,
    {
        let mut state = self.state.lock();
        writes
            .into_iter()
            .map(|(path, value)| state.write_path(&path, &value))
            .sum()
    }

    /// Replace the value of `id` only if it is still uninitialized, without
    /// marking it dirty. Returns whether the value was seeded.
    pub fn seed(&self, id: SubscriptionId, value: Value) -> bool {
        let mut state = self.state.lock();
        match state.by_id.get_mut(&id) {
            Some(subscription) if subscription.value.is_uninitialized() && !subscription.dirty => {
                subscription.value = value;
                true
            }
            _ => false,
        }
    }

    /// Take every changed `(id, value)` since the previous drain.
    #[must_use]
    pub fn drain_dirty(&self) -> Vec<(SubscriptionId, Value)> {
        let mut state = self.state.lock();
        let ids = std::mem::take(&mut state.dirty);

        ids.into_iter()
            .filter_map(|id| {
                let subscription = state.by_id.get_mut(&id)?;
                if !subscription.dirty {
                    return None;
                }
                subscription.dirty = false;
                Some((id, subscription.value.clone()))
            })
            .collect()
    }

    /// Whether anything changed since the last drain.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.state.lock().dirty.is_empty()
    }

    /// Current value of `id`.
    #[must_use]
    pub fn value(&self, id: SubscriptionId) -> Option<Value> {
        self.state.lock().by_id.get(&id).map(|s| s.value.clone())
    }

    /// Path of `id`.
    #[must_use]
    pub fn path_of(&self, id: SubscriptionId) -> Option<Path> {
        self.state.lock().by_id.get(&id).map(|s| s.path.clone())
    }

    /// Number of registered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().by_id.len()
    }

    /// Whether no ids are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().by_id.is_empty()
    }

    /// Snapshot statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            subscriptions: state.by_id.len(),
            paths: state.by_path.len(),
            dirty: state.dirty.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::thread;

    use rust_decimal::Decimal;

    use super::*;

    fn ask() -> Path {
        Path::new("BINANCE", "", "ETHUSDT", "ASK", None)
    }

    fn num(raw: &str) -> Value {
        Value::Number(Decimal::from_str(raw).unwrap())
    }

    #[test]
    fn subscribe_starts_uninitialized_and_clean() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());

        assert_eq!(registry.value(1), Some(Value::Uninitialized));
        assert!(!registry.is_dirty());
        assert!(registry.drain_dirty().is_empty());
    }

    #[test]
    fn same_representation_dirties_once() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());

        assert_eq!(registry.set_by_path(&ask(), &num("100.5")), 1);
        assert_eq!(registry.set_by_path(&ask(), &num("100.5")), 0);

        assert_eq!(registry.drain_dirty(), vec![(1, num("100.5"))]);
        assert!(registry.drain_dirty().is_empty());
    }

    #[test]
    fn multiple_writes_coalesce_to_last_value() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());

        registry.set_by_path(&ask(), &num("1"));
        registry.set_by_path(&ask(), &num("2"));
        registry.set_by_path(&ask(), &num("3"));

        assert_eq!(registry.drain_dirty(), vec![(1, num("3"))]);
    }

    #[test]
    fn two_ids_on_one_path_both_update() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());
        registry.subscribe(2, ask());

        assert_eq!(registry.set_by_path(&ask(), &num("7")), 2);

        let mut drained = registry.drain_dirty();
        drained.sort_by_key(|(id, _)| *id);
        assert_eq!(drained, vec![(1, num("7")), (2, num("7"))]);
    }

    #[test]
    fn write_without_subscriber_is_dropped() {
        let registry = ValueRegistry::new();
        assert_eq!(registry.set_by_path(&ask(), &num("1")), 0);
        assert!(!registry.set_by_id(9, &num("1")));
        assert!(!registry.is_dirty());
    }

    #[test]
    fn resubscribe_moves_reverse_mapping() {
        let registry = ValueRegistry::new();
        let bid = Path::new("BINANCE", "", "ETHUSDT", "BID", None);
        registry.subscribe(1, ask());
        registry.subscribe(1, bid.clone());

        assert_eq!(registry.set_by_path(&ask(), &num("1")), 0);
        assert_eq!(registry.set_by_path(&bid, &num("2")), 1);
        assert_eq!(registry.stats().paths, 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_clears_dirty() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());
        registry.set_by_path(&ask(), &num("1"));

        registry.unsubscribe(1);
        registry.unsubscribe(1);
        registry.unsubscribe(42);

        assert!(!registry.is_dirty());
        assert!(registry.drain_dirty().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn set_by_id_marks_dirty() {
        let registry = ValueRegistry::new();
        registry.subscribe(5, Path::clock());

        assert!(registry.set_by_id(5, &Value::text("tick")));
        assert!(registry.is_dirty());
        assert_eq!(registry.drain_dirty(), vec![(5, Value::text("tick"))]);
    }

    #[test]
    fn seed_only_fills_uninitialized() {
        let registry = ValueRegistry::new();
        registry.subscribe(1, ask());

        assert!(registry.seed(1, num("4")));
        assert!(!registry.is_dirty());
        assert!(!registry.seed(1, num("5")));
        assert_eq!(registry.value(1), Some(num("4")));
    }

    #[test]
    fn set_many_applies_batch() {
        let registry = ValueRegistry::new();
        let bid = Path::new("BINANCE", "", "ETHUSDT", "BID", None);
        registry.subscribe(1, ask());
        registry.subscribe(2, bid.clone());

        let changed = registry.set_many(vec![(ask(), num("2")), (bid, num("1"))]);
        assert_eq!(changed, 2);
        assert_eq!(registry.drain_dirty().len(), 2);
    }

    #[test]
    fn drain_preserves_first_change_order() {
        let registry = ValueRegistry::new();
        let bid = Path::new("BINANCE", "", "ETHUSDT", "BID", None);
        registry.subscribe(1, ask());
        registry.subscribe(2, bid.clone());

        registry.set_by_path(&bid, &num("1"));
        registry.set_by_path(&ask(), &num("2"));
        registry.set_by_path(&bid, &num("3"));

        let ids: Vec<_> = registry.drain_dirty().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn concurrent_writers_and_drainer() {
        let registry = Arc::new(ValueRegistry::new());
        for id in 0..8 {
            registry.subscribe(id, Path::new("BINANCE", "", "ETHUSDT", &format!("F{id}"), None));
        }

        let writers: Vec<_> = (0..8)
            .map(|id| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let path = Path::new("BINANCE", "", "ETHUSDT", &format!("F{id}"), None);
                    for n in 0..500 {
                        registry.set_by_path(&path, &Value::integer(n));
                    }
                })
            })
            .collect();

        let mut drained = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            drained += registry.drain_dirty().len();
        }
        for writer in writers {
            writer.join().unwrap();
        }
        drained += registry.drain_dirty().len();

        assert!(drained >= 8);
        for id in 0..8 {
            assert_eq!(registry.value(id), Some(Value::integer(499)));
        }
        assert!(!registry.is_dirty());
    }
}
