// tests/progress.rs

use libpack::build::ProgressAggregator;
use libpack::types::BuildTarget;
use proptest::prelude::*;

#[test]
fn aggregate_follows_the_slowest_target() {
    let mut progress = ProgressAggregator::new();
    progress.reset(&[BuildTarget::Esm, BuildTarget::Cjs], 10);

    assert_eq!(progress.report(BuildTarget::Esm, 4), Some(0));
    assert_eq!(progress.report(BuildTarget::Cjs, 2), Some(2));
    assert_eq!(progress.report(BuildTarget::Esm, 9), Some(2));
    assert_eq!(progress.report(BuildTarget::Cjs, 7), Some(7));
    assert_eq!(progress.last_reported(), 7);
}

#[test]
fn slowest_target_is_the_one_holding_the_aggregate() {
    let mut progress = ProgressAggregator::new();
    assert_eq!(progress.slowest(), None);

    progress.reset(&[BuildTarget::Esm, BuildTarget::Cjs], 4);
    assert_eq!(progress.slowest(), Some(BuildTarget::Esm));

    progress.report(BuildTarget::Esm, 3);
    assert_eq!(progress.slowest(), Some(BuildTarget::Cjs));

    progress.report(BuildTarget::Cjs, 4);
    assert_eq!(progress.slowest(), Some(BuildTarget::Esm));
}

#[test]
fn regressions_are_dropped() {
    let mut progress = ProgressAggregator::new();
    progress.reset(&[BuildTarget::Esm], 5);

    assert_eq!(progress.report(BuildTarget::Esm, 3), Some(3));
    assert_eq!(progress.report(BuildTarget::Esm, 1), None);
    assert_eq!(progress.last_reported(), 3);
}

#[test]
fn unknown_targets_are_ignored() {
    let mut progress = ProgressAggregator::new();
    progress.reset(&[BuildTarget::Esm], 5);

    assert_eq!(progress.report(BuildTarget::Cjs, 5), None);
    assert_eq!(progress.targets().collect::<Vec<_>>(), vec![BuildTarget::Esm]);
}

#[test]
fn complete_forces_the_total_and_reset_starts_over() {
    let mut progress = ProgressAggregator::new();
    progress.reset(&[BuildTarget::Esm, BuildTarget::Cjs], 8);
    progress.report(BuildTarget::Esm, 8);

    assert_eq!(progress.complete(), 8);
    assert_eq!(progress.last_reported(), 8);

    progress.reset(&[BuildTarget::Cjs], 3);
    assert_eq!(progress.total(), 3);
    assert_eq!(progress.last_reported(), 0);
    assert_eq!(progress.report(BuildTarget::Cjs, 1), Some(1));
}

fn target() -> impl Strategy<Value = BuildTarget> {
    prop_oneof![Just(BuildTarget::Esm), Just(BuildTarget::Cjs)]
}

proptest! {
    #[test]
    fn reported_values_never_decrease(
        reports in prop::collection::vec((target(), 0u64..=50), 0..100)
    ) {
        let mut progress = ProgressAggregator::new();
        progress.reset(&BuildTarget::ALL, 50);

        let mut last = 0;
        for (target, completed) in reports {
            if let Some(value) = progress.report(target, completed) {
                prop_assert!(value >= last);
                prop_assert!(value <= 50);
                last = value;
            }
            prop_assert_eq!(progress.last_reported(), last);
        }

        prop_assert_eq!(progress.complete(), 50);
    }

    #[test]
    fn per_target_counts_in_order_end_at_the_total(total in 1u64..40) {
        let mut progress = ProgressAggregator::new();
        progress.reset(&BuildTarget::ALL, total);

        let mut seen = Vec::new();
        for done in 1..=total {
            for target in BuildTarget::ALL {
                if let Some(value) = progress.report(target, done) {
                    seen.push(value);
                }
            }
        }

        prop_assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(seen.last().copied(), Some(total));
    }
}
