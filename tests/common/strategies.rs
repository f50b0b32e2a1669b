use proptest::prelude::*;

/// Strategy for generating condition limiter identifiers (database names)
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for a limit and a set of distinct identifiers strictly larger than it
pub fn limit_and_identifiers_strategy() -> impl Strategy<Value = (usize, Vec<String>)> {
    (1usize..8).prop_flat_map(|limit| {
        (
            Just(limit),
            prop::collection::hash_set(identifier_strategy(), (limit + 1)..(limit + 6))
                .prop_map(|set| set.into_iter().collect::<Vec<_>>()),
        )
    })
}
