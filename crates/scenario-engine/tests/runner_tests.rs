use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scenario_engine::{Runner, SimulatedWorld, World};
use scenario_test_utils::{
    combo_log, recording, ChoiceConstraint, CounterContext, NoopConstraint, COUNTER_SLOT,
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn runner() -> Runner<CounterContext> {
    Runner::new("development", Arc::new(SimulatedWorld::new(1337)))
}

#[tokio::test]
async fn test_every_combination_runs_once() {
    let log = combo_log();
    let scenario = recording("grid", &log)
        .constraint(ChoiceConstraint::new("token", &["a", "b"]))
        .constraint(ChoiceConstraint::new("actor", &["x", "y", "z"]));

    let result = runner().run(&scenario).await.unwrap();

    assert!(result.is_pass(), "{:?}", result.error);
    assert_eq!(result.num_solution_sets, 6);

    let seen = log.lock().clone();
    assert_eq!(seen.len(), 6);
    assert_eq!(
        seen[0],
        vec!["token:a".to_string(), "actor:x".to_string()]
    );
    assert_eq!(
        seen[5],
        vec!["token:b".to_string(), "actor:z".to_string()]
    );
    let unique: BTreeSet<_> = seen.into_iter().collect();
    assert_eq!(unique.len(), 6);
}

#[tokio::test]
async fn test_world_state_does_not_leak_between_combos() {
    let log = combo_log();
    let scenario = recording("isolated", &log)
        .constraint(ChoiceConstraint::new("first", &["1", "2", "3"]))
        .constraint(ChoiceConstraint::new("second", &["1", "2"]));

    let runner = runner();
    let before = runner.world().timestamp().await.unwrap();
    let result = runner.run(&scenario).await.unwrap();

    // the recording body fails on any counter carried over from a prior combo
    assert!(result.is_pass(), "{:?}", result.error);
    assert_eq!(runner.world().read_u64(COUNTER_SLOT), 0);
    assert_eq!(runner.world().timestamp().await.unwrap(), before);
}

#[tokio::test]
async fn test_zero_constraints_run_exactly_once() {
    let log = combo_log();
    let result = runner().run(&recording("baseline", &log)).await.unwrap();

    assert_eq!(result.num_solution_sets, 1);
    assert_eq!(result.gas_used, 21_000);
    assert_eq!(log.lock().as_slice(), &[Vec::<String>::new()]);
}

#[tokio::test]
async fn test_constraint_without_solutions_keeps_baseline() {
    let log = combo_log();
    let scenario = recording("noop", &log).constraint(NoopConstraint);
    let result = runner().run(&scenario).await.unwrap();

    assert_eq!(result.num_solution_sets, 1);
    assert!(result.is_pass());
}

#[tokio::test]
async fn test_result_records_scenario_location() {
    let log = combo_log();
    let result = runner().run(&recording("located", &log)).await.unwrap();
    assert!(result.file.contains("runner_tests.rs"), "{}", result.file);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_combo_count_is_product_of_choices(sizes in prop::collection::vec(1usize..4, 0..4)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let log = combo_log();

        let choices: Vec<Vec<String>> = sizes
            .iter()
            .map(|&n| (0..n).map(|i| i.to_string()).collect())
            .collect();
        let mut scenario = recording("product", &log);
        for (i, list) in choices.iter().enumerate() {
            let refs: Vec<&str> = list.iter().map(String::as_str).collect();
            scenario = scenario.constraint(ChoiceConstraint::new(format!("c{i}"), &refs));
        }

        let result = rt.block_on(runner().run(&scenario)).unwrap();
        let expected: usize = sizes.iter().product();

        prop_assert!(result.is_pass());
        prop_assert_eq!(result.num_solution_sets, expected as u64);
        prop_assert_eq!(log.lock().len(), expected);
    }
}
