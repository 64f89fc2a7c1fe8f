//! Property test for `Update`'s idempotence (spec.md §8): re-adding a set
//! of identifiers that are already known never changes the chooser's
//! counts, regardless of how many peers were already present or how the
//! batch is re-ordered.

use std::collections::HashSet;

use proptest::prelude::*;

use circus::{Chooser, PeerIdentifier};
use circus_test::FakeTransport;

proptest! {
    #[test]
    fn readding_known_peers_never_changes_counts(n in 0usize..40, reorder_seed in 0u64..1000) {
        let transport = FakeTransport::new();
        let chooser = Chooser::new(transport);
        // Pin the goal at zero so this exercises pure `Update` bookkeeping,
        // undisturbed by `satisfyGoal` retaining anything.
        chooser.set_goal(0);

        let ids: Vec<PeerIdentifier> = (0..n).map(|i| PeerIdentifier::new(format!("127.0.0.{}", i))).collect();
        chooser.update(ids.clone(), Vec::new());
        let before = chooser.snapshot();

        let mut reordered = ids.clone();
        let mut state = reorder_seed.wrapping_add(1);
        for i in (1..reordered.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let j = (state >> 33) as usize % (i + 1);
            reordered.swap(i, j);
        }

        chooser.update(reordered, Vec::new());
        let after = chooser.snapshot();

        prop_assert_eq!(before, after);
        let seen: HashSet<&str> = ids.iter().map(PeerIdentifier::as_str).collect();
        prop_assert_eq!(seen.len(), n);
        prop_assert_eq!(after.unused, n);
    }
}
