//! Property tests for level certification over arbitrary category results.

use costsource_conformance::*;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn level() -> impl Strategy<Value = ConformanceLevel> {
    prop::sample::select(ConformanceLevel::ALL.to_vec())
}

fn category() -> impl Strategy<Value = TestCategory> {
    prop::sample::select(TestCategory::ALL.to_vec())
}

/// (category, level, failing)
fn outcome_spec() -> impl Strategy<Value = (TestCategory, ConformanceLevel, bool)> {
    (category(), level(), prop::bool::weighted(0.2))
}

fn build(specs: &[(TestCategory, ConformanceLevel, bool)]) -> Vec<CategoryResult> {
    TestCategory::ALL
        .iter()
        .map(|cat| {
            let outcomes = specs
                .iter()
                .enumerate()
                .filter(|(_, (c, _, _))| c == cat)
                .map(|(i, (c, l, failing))| {
                    let id = format!("{}.check_{}", c.id_prefix(), i);
                    if *failing {
                        TestOutcome::fail(id, *c, *l, "generated failure")
                    } else {
                        TestOutcome::pass(id, *c, *l)
                    }
                })
                .collect();
            CategoryResult::from_outcomes(*cat, outcomes, Default::default(), 0)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_added_failure_never_raises_level(
        specs in prop::collection::vec(outcome_spec(), 0..40),
        extra in (category(), level()),
        target in level(),
    ) {
        let before = achieved_level(target, &build(&specs));

        let mut worse = specs.clone();
        worse.push((extra.0, extra.1, true));
        let after = achieved_level(target, &build(&worse));

        prop_assert!(after <= before);
    }

    #[test]
    fn prop_achieved_level_has_no_failures_at_or_below_it(
        specs in prop::collection::vec(outcome_spec(), 0..40),
        target in level(),
    ) {
        let categories = build(&specs);
        if let Some(achieved) = achieved_level(target, &categories) {
            prop_assert!(achieved <= target);
            for required in achieved.required_categories() {
                let result = categories.iter().find(|c| c.category == *required).unwrap();
                prop_assert!(!result
                    .outcomes
                    .iter()
                    .any(|o| o.level <= achieved && o.is_failure()));
            }
        }
    }

    #[test]
    fn prop_timed_out_category_blocks_levels_requiring_it(
        specs in prop::collection::vec(outcome_spec(), 0..40),
        cut in category(),
        target in level(),
    ) {
        let mut categories = build(&specs);
        for c in categories.iter_mut().filter(|c| c.category == cut) {
            *c = CategoryResult::timed_out(cut, 0);
        }
        if let Some(achieved) = achieved_level(target, &categories) {
            prop_assert!(!achieved.required_categories().contains(&cut));
        }
    }
}
