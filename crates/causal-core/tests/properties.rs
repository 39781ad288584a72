//! Property-based tests for vector timestamps and clocks
//!
//! These verify the laws causal delivery leans on:
//!  - merge is idempotent and commutative
//!  - merging never moves a counter backwards
//!  - exactly one of {equal, before, after, concurrent} holds for any pair

use causal_core::{CausalOrder, Membership, ProcessId, Timestamp, VectorClock};
use proptest::prelude::*;

const MEMBERS: usize = 4;

fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    prop::collection::vec(0u64..6, MEMBERS).prop_map(|counters| {
        Timestamp::from_entries(
            counters
                .into_iter()
                .enumerate()
                .map(|(i, n)| (i.to_string(), n)),
        )
    })
}

fn clock_at(stamp: &Timestamp) -> VectorClock {
    let members = Membership::numbered(MEMBERS);
    let mut clock = VectorClock::new(ProcessId::new("0"), &members).unwrap();
    clock.merge(stamp);
    clock
}

proptest! {
    #[test]
    fn merge_is_idempotent(a in timestamp_strategy(), b in timestamp_strategy()) {
        let mut clock = clock_at(&a);
        clock.merge(&b);
        let once = clock.snapshot();
        clock.merge(&b);
        prop_assert_eq!(clock.snapshot(), once);
    }

    #[test]
    fn merge_is_commutative(
        base in timestamp_strategy(),
        a in timestamp_strategy(),
        b in timestamp_strategy(),
    ) {
        let mut left = clock_at(&base);
        left.merge(&a);
        left.merge(&b);

        let mut right = clock_at(&base);
        right.merge(&b);
        right.merge(&a);

        prop_assert_eq!(left.snapshot(), right.snapshot());
    }

    #[test]
    fn merge_never_decreases(a in timestamp_strategy(), b in timestamp_strategy()) {
        let mut clock = clock_at(&a);
        let before = clock.snapshot();
        clock.merge(&b);
        let after = clock.snapshot();

        prop_assert!(after.dominates(&before));
        prop_assert!(after.dominates(&b));
    }

    #[test]
    fn exactly_one_relation_holds(a in timestamp_strategy(), b in timestamp_strategy()) {
        let relations = [
            a == b,
            a.happens_before(&b),
            a.happens_after(&b),
            a.is_concurrent_with(&b),
        ];
        prop_assert_eq!(relations.iter().filter(|&&r| r).count(), 1);
    }

    #[test]
    fn compare_is_antisymmetric(a in timestamp_strategy(), b in timestamp_strategy()) {
        let flipped = match a.compare(&b) {
            CausalOrder::Before => CausalOrder::After,
            CausalOrder::After => CausalOrder::Before,
            other => other,
        };
        prop_assert_eq!(b.compare(&a), flipped);
    }

    #[test]
    fn increment_happens_after(a in timestamp_strategy()) {
        let mut clock = clock_at(&a);
        let before = clock.snapshot();
        clock.increment();
        prop_assert!(before.happens_before(&clock.snapshot()));
    }
}
