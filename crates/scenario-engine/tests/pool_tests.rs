use pretty_assertions::assert_eq;
use scenario_engine::{exit_code, ForkSpec, Orchestrator, Orphan, PoolError, RegistryError, Summary};
use scenario_test_utils::{
    asserting, combo_log, failing, loader, passing, recording, simulated_factory,
    ChoiceConstraint, CounterContext, UnsolvableConstraint,
};
use std::collections::BTreeMap;

fn pool(
    build: impl Fn() -> Vec<scenario_engine::Scenario<CounterContext>> + Send + Sync + 'static,
    workers: usize,
) -> Orchestrator<CounterContext> {
    Orchestrator::new(loader(build), simulated_factory()).with_workers(workers)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_each_scenario_reported_exactly_once() {
    let orchestrator = pool(
        || (1..=5).map(|i| passing(&format!("s{i}"))).collect(),
        2,
    );

    let results = orchestrator.run_base(&ForkSpec::new("development")).await.unwrap().results;

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for result in &results {
        *counts.entry(result.scenario.clone()).or_default() += 1;
    }
    assert_eq!(results.len(), 5);
    assert!(counts.values().all(|&n| n == 1));
    assert!(results.iter().all(|r| r.base == "development"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_do_not_stop_other_scenarios() {
    let orchestrator = pool(
        || {
            vec![
                passing("a"),
                failing("b", "transfer reverted"),
                asserting("c", 3, 4),
                passing("d"),
            ]
        },
        2,
    );

    let results = orchestrator.run_base(&ForkSpec::new("development")).await.unwrap().results;
    let summary = Summary::of(&results);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.passes, 2);
    assert_eq!(summary.failures, 2);
    assert_eq!(exit_code(&results), 1);

    let c = results.iter().find(|r| r.scenario == "c").unwrap();
    let diff = c.diff.as_ref().unwrap();
    assert_eq!(diff.actual, "3");
    assert_eq!(diff.expected, "4");

    let b = results.iter().find(|r| r.scenario == "b").unwrap();
    assert_eq!(b.error.as_deref(), Some("transfer reverted"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_only_flag_skips_everything_else() {
    let log = combo_log();
    let shared = log.clone();
    let orchestrator = pool(
        move || {
            vec![
                recording("a", &shared)
                    .constraint(ChoiceConstraint::new("a", &["x"]))
                    .skip(),
                recording("b", &shared)
                    .constraint(ChoiceConstraint::new("b", &["x"]))
                    .only(),
                recording("c", &shared).constraint(ChoiceConstraint::new("c", &["x"])),
            ]
        },
        2,
    );

    let results = orchestrator.run_base(&ForkSpec::new("development")).await.unwrap().results;

    let executed: Vec<&str> = results
        .iter()
        .filter(|r| !r.skipped)
        .map(|r| r.scenario.as_str())
        .collect();
    let mut skipped: Vec<&str> = results
        .iter()
        .filter(|r| r.skipped)
        .map(|r| r.scenario.as_str())
        .collect();
    skipped.sort_unstable();

    assert_eq!(executed, vec!["b"]);
    assert_eq!(skipped, vec!["a", "c"]);
    assert_eq!(exit_code(&results), 0);

    // only b's single combo ever reached a test body
    assert_eq!(log.lock().as_slice(), &[vec!["b:x".to_string()]]);
    for name in ["a", "c"] {
        let result = results.iter().find(|r| r.scenario == name).unwrap();
        assert_eq!(result.num_solution_sets, 0);
        assert_eq!(result.gas_used, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_names_fail_registration() {
    let orchestrator = pool(|| vec![passing("same"), passing("same")], 2);

    let err = orchestrator
        .run_base(&ForkSpec::new("development"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PoolError::Registry(RegistryError::DuplicateName(name)) if name == "same"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_more_workers_than_scenarios() {
    let orchestrator = pool(|| vec![passing("lonely")], 8);
    let results = orchestrator.run_base(&ForkSpec::new("development")).await.unwrap().results;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_pass());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_pool_keeps_finished_results() {
    let orchestrator = pool(
        || {
            vec![
                passing("ok1"),
                passing("ok2"),
                passing("ok3"),
                passing("bad").constraint(UnsolvableConstraint),
            ]
        },
        2,
    );

    let run = orchestrator.run_base(&ForkSpec::new("development")).await.unwrap();

    assert_eq!(
        run.orphaned,
        vec![Orphan {
            base: "development".into(),
            scenario: "bad".into(),
        }]
    );
    let mut finished: Vec<&str> = run.results.iter().map(|r| r.scenario.as_str()).collect();
    finished.sort_unstable();
    assert_eq!(finished, vec!["ok1", "ok2", "ok3"]);
    assert!(run.results.iter().all(|r| r.is_pass()));
    assert_eq!(exit_code(&run.results), 0);
    assert_eq!(run.exit_code(), 1);
}
