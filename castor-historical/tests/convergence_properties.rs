//! Property tests: convergence under permutation and CSN monotonicity.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use castor_core::csn::Csn;
use castor_core::dn::Dn;
use castor_core::entry::{AttributeDescription, Entry};
use castor_core::modification::{Modification, ModificationType};
use castor_core::schema::Schema;
use castor_historical::attribute::AttributeHistory;
use castor_historical::entry_history::EntryHistory;
use uuid::Uuid;

const ATTR: &str = "description";
const VALUES: [&str; 4] = ["v0", "v1", "v2", "v3"];

/// One abstract operation on the attribute.
#[derive(Debug, Clone)]
enum Op {
    AddValue(usize),
    DeleteValue(usize),
    DeleteAttribute,
    Replace(Vec<usize>),
}

impl Op {
    fn to_modification(&self) -> Modification {
        let values = |indexes: &[usize]| -> Vec<&str> {
            indexes.iter().map(|&i| VALUES[i]).collect()
        };
        match self {
            Op::AddValue(i) => Modification::of(ModificationType::Add, ATTR, &values(&[*i])),
            Op::DeleteValue(i) => Modification::of(ModificationType::Delete, ATTR, &values(&[*i])),
            Op::DeleteAttribute => Modification::of(ModificationType::Delete, ATTR, &[]),
            Op::Replace(indexes) => Modification::of(ModificationType::Replace, ATTR, &values(indexes)),
        }
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..VALUES.len()).prop_map(Op::AddValue),
        (0..VALUES.len()).prop_map(Op::DeleteValue),
        Just(Op::DeleteAttribute),
        prop::collection::vec(0..VALUES.len(), 0..3).prop_map(Op::Replace),
    ]
}

/// A set of causally-independent changes: every op carries a distinct CSN.
fn changes_strategy() -> impl Strategy<Value = Vec<(Csn, Op)>> {
    prop::collection::vec(op_strategy(), 1..8).prop_map(|ops| {
        ops.into_iter()
            .enumerate()
            // Distinct timestamps and alternating replicas.
            .map(|(i, op)| (Csn::new((i as u64 + 1) * 10, 0, (i % 3) as u16), op))
            .collect()
    })
}

fn initial_entry(seed_values: &[usize]) -> Entry {
    let mut entry = Entry::new(Dn::parse("o=test").unwrap(), Uuid::nil());
    if !seed_values.is_empty() {
        entry.put(
            AttributeDescription::new(ATTR),
            seed_values.iter().map(|&i| VALUES[i].to_string()).collect(),
        );
    }
    entry
}

/// Replay the changes in the given order from the given initial entry and
/// return (final sorted value set, encoded history).
fn run(initial: &Entry, order: &[(Csn, Op)]) -> (Vec<String>, Vec<String>) {
    let mut entry = initial.clone();
    let mut hist = EntryHistory::new(Arc::new(Schema::new()));
    for (csn, op) in order {
        let replayed = hist.replay_modifications(*csn, vec![op.to_modification()], &entry);
        entry.apply_modifications(&replayed.mods);
    }
    let mut values = entry
        .get(&AttributeDescription::new(ATTR))
        .unwrap_or_default()
        .to_vec();
    values.sort();
    (values, hist.encode_values())
}

proptest! {
    // Convergence: any two delivery orders of the same independent changes
    // end in the same value set and the same history.
    #[test]
    fn permutations_converge(
        changes in changes_strategy(),
        seed in prop::collection::vec(0..VALUES.len(), 0..3),
        shuffle in prop::collection::vec(any::<u32>(), 1..8),
    ) {
        let initial = initial_entry(&seed);

        let mut permuted = changes.clone();
        // Deterministic shuffle driven by proptest input.
        for (i, r) in shuffle.iter().enumerate() {
            if permuted.len() > 1 {
                let j = (*r as usize) % permuted.len();
                let k = i % permuted.len();
                permuted.swap(j, k);
            }
        }

        let a = run(&initial, &changes);
        let b = run(&initial, &permuted);
        prop_assert_eq!(a.0, b.0, "value sets diverged");
        prop_assert_eq!(a.1, b.1, "histories diverged");
    }

    // Monotonicity: per-value record times and attribute-wide times never
    // regress across any delivery order.
    #[test]
    fn multi_valued_times_never_regress(
        changes in changes_strategy(),
        seed in prop::collection::vec(0..VALUES.len(), 0..3),
    ) {
        let mut entry = initial_entry(&seed);
        let mut hist = EntryHistory::new(Arc::new(Schema::new()));
        let desc = AttributeDescription::new(ATTR);

        let mut last_times: BTreeMap<String, Csn> = BTreeMap::new();
        let mut last_delete: Option<Csn> = None;
        let mut last_update: Option<Csn> = None;

        for (csn, op) in &changes {
            let replayed = hist.replay_modifications(*csn, vec![op.to_modification()], &entry);
            entry.apply_modifications(&replayed.mods);

            let Some(AttributeHistory::Multiple(multi)) =
                hist.attribute_history(&desc)
            else {
                continue;
            };

            if let Some(previous) = last_delete {
                prop_assert!(multi.delete_time().is_some_and(|t| t.is_newer_than_or_equal_to(previous)));
            }
            last_delete = multi.delete_time();

            if let Some(previous) = last_update {
                prop_assert!(multi.last_update_time().is_some_and(|t| t.is_newer_than_or_equal_to(previous)));
            }
            last_update = multi.last_update_time();

            for value in VALUES {
                if let Some(record) = multi.value_history(value) {
                    if let Some(previous) = last_times.get(value) {
                        prop_assert!(
                            record.time().is_newer_than_or_equal_to(*previous),
                            "record for {} regressed", value
                        );
                    }
                    last_times.insert(value.to_string(), record.time());
                } else {
                    // A purged record may reappear later at any newer CSN;
                    // forget its floor.
                    last_times.remove(value);
                }
            }
        }
    }
}
