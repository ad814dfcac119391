//! Property tests for the value registry's change tracking.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crypto_rtd::{Path, SubscriptionId, Value, ValueRegistry};
use proptest::prelude::*;
use rust_decimal::Decimal;

const PATH_COUNT: usize = 3;

fn path(index: usize) -> Path {
    Path::new("BINANCE", "", &format!("SYM{index}"), "ASK", None)
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Uninitialized),
        prop::sample::select(vec!["1", "1.0", "2", "2.50", "2.5"])
            .prop_map(|raw| Value::Number(Decimal::from_str(raw).unwrap())),
        "[a-c]{1,2}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Boolean),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Write(usize, Value),
    Drain,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PATH_COUNT, value_strategy()).prop_map(|(p, v)| Op::Write(p, v)),
        1 => Just(Op::Drain),
    ]
}

/// Reference model: each id remembers its rendered value and a dirty flag.
#[derive(Default)]
struct Model {
    values: BTreeMap<SubscriptionId, Value>,
    dirty: BTreeSet<SubscriptionId>,
}

impl Model {
    fn write(&mut self, ids: &[SubscriptionId], value: &Value) {
        for id in ids {
            let current = self.values.entry(*id).or_default();
            if !current.same_representation(value) {
                *current = value.clone();
                self.dirty.insert(*id);
            }
        }
    }

    fn drain(&mut self) -> BTreeMap<SubscriptionId, Value> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|id| (id, self.values[&id].clone()))
            .collect()
    }
}

proptest! {
    #[test]
    fn repeated_write_dirties_at_most_once(value in value_strategy()) {
        let registry = ValueRegistry::new();
        registry.subscribe(1, path(0));

        registry.set_by_path(&path(0), &value);
        registry.set_by_path(&path(0), &value);

        prop_assert!(registry.drain_dirty().len() <= 1);
    }

    #[test]
    fn second_drain_is_empty(writes in prop::collection::vec((0..PATH_COUNT, value_strategy()), 0..20)) {
        let registry = ValueRegistry::new();
        for id in 0..6 {
            registry.subscribe(id, path(usize::try_from(id).unwrap() % PATH_COUNT));
        }
        for (p, value) in &writes {
            registry.set_by_path(&path(*p), value);
        }

        let _ = registry.drain_dirty();
        prop_assert!(registry.drain_dirty().is_empty());
        prop_assert!(!registry.is_dirty());
    }

    #[test]
    fn shared_path_updates_every_subscriber(value in value_strategy()) {
        prop_assume!(!value.is_uninitialized());

        let registry = ValueRegistry::new();
        registry.subscribe(1, path(1));
        registry.subscribe(2, path(1));

        prop_assert_eq!(registry.set_by_path(&path(1), &value), 2);
        prop_assert_eq!(registry.value(1), Some(value.clone()));
        prop_assert_eq!(registry.value(2), Some(value));
    }

    #[test]
    fn drains_match_reference_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let registry = ValueRegistry::new();
        let mut by_path: BTreeMap<usize, Vec<SubscriptionId>> = BTreeMap::new();
        for id in 0..6 {
            let p = usize::try_from(id).unwrap() % PATH_COUNT;
            registry.subscribe(id, path(p));
            by_path.entry(p).or_default().push(id);
        }
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Write(p, value) => {
                    registry.set_by_path(&path(p), &value);
                    model.write(&by_path[&p], &value);
                }
                Op::Drain => {
                    let drained: BTreeMap<_, _> = registry.drain_dirty().into_iter().collect();
                    let expected = model.drain();
                    prop_assert_eq!(drained.len(), expected.len());
                    for (id, value) in &expected {
                        prop_assert!(drained.get(id).is_some_and(|v| v.same_representation(value)));
                    }
                }
            }
        }
    }
}
