//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys and mutation sequences.

use crate::fixtures::Counter;
use proptest::prelude::*;

/// Strategy for generating storage keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.:-]{0,23}").expect("Invalid regex")
}

/// Strategy for a single mutation: `Some` writes a counter, `None` erases.
pub fn mutation_strategy() -> impl Strategy<Value = Option<Counter>> {
    prop_oneof![
        4 => any::<u32>().prop_map(|n| Some(Counter::new(n))),
        1 => Just(None),
    ]
}

/// Strategy for a non-empty sequence of mutations.
pub fn mutation_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Option<Counter>>> {
    prop::collection::vec(mutation_strategy(), 1..=max_len.max(1))
}

/// Strategy for a mutation sequence paired with which mutations should fail.
pub fn faulty_sequence_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<(Option<Counter>, bool)>> {
    prop::collection::vec((mutation_strategy(), prop::bool::weighted(0.3)), 1..=max_len.max(1))
}
