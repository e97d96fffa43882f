//! Combinatorial solver and executor
//!
//! For one scenario against one world the runner:
//! 1. Takes the initial checkpoint and builds a base context
//! 2. Asks every constraint for its solutions (the choice lists)
//! 3. Walks the cartesian product of `[[identity]] ++ choice lists`
//! 4. Per combo: fresh context, apply solutions, re-check every constraint,
//!    run the test body, then revert the world no matter what
//!
//! The first failing combo stops the scenario. Combos never run
//! concurrently because they share one world.

use crate::combo::Combos;
use crate::error::{trace, RunnerError, ScenarioError};
use crate::scenario::{Scenario, ScenarioContext, Solution};
use crate::types::{ExecutionReceipt, ScenarioResult};
use crate::world::Isolation;
use std::sync::Arc;
use std::time::Instant;

/// Solves and executes scenarios against one world
pub struct Runner<C: ScenarioContext> {
    base: String,
    world: Arc<C::World>,
}

impl<C: ScenarioContext> Runner<C> {
    /// Create a runner for `base` backed by `world`
    #[inline]
    #[must_use]
    pub fn new(base: impl Into<String>, world: Arc<C::World>) -> Self {
        Self {
            base: base.into(),
            world,
        }
    }

    /// Base name stamped on results
    #[inline]
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The world this runner executes against
    #[inline]
    #[must_use]
    pub fn world(&self) -> &Arc<C::World> {
        &self.world
    }

    /// Run every combo of `scenario` and produce exactly one result
    ///
    /// # Errors
    /// - `RunnerError::Initialize` if the base context cannot be built
    /// - `RunnerError::Solve` if a constraint fails to propose solutions
    /// - `RunnerError::Isolation` if the world cannot be reverted, or
    ///   `RunnerError::IsolationAfterFailure` when that happens right after a
    ///   failing combo
    ///
    /// Failures inside a combo are not errors here; they end up in the
    /// returned result.
    pub async fn run(&self, scenario: &Scenario<C>) -> Result<ScenarioResult, RunnerError> {
        let start = Instant::now();
        let world = &*self.world;
        let requirements = scenario.requirements_spec();

        let mut isolation = Isolation::acquire(world).await?;
        let context = C::initialize(world)
            .await
            .map_err(RunnerError::Initialize)?;

        let mut choice_lists: Vec<Vec<Solution<C>>> = vec![vec![Solution::identity()]];
        for constraint in scenario.constraints() {
            let solutions = constraint
                .solve(requirements, &context, world)
                .await
                .map_err(|source| RunnerError::Solve {
                    constraint: constraint.name().to_string(),
                    source,
                })?;
            choice_lists.push(solutions.into_choices());
        }

        let combos = Combos::new(&choice_lists);
        tracing::debug!(
            base = %self.base,
            scenario = scenario.name(),
            combos = combos.total(),
            "solved scenario"
        );

        let mut total_gas = 0u64;
        let mut attempted = 0u64;
        let mut failure: Option<ScenarioError> = None;

        for combo in combos {
            let labels: Vec<&str> = combo.iter().map(|s| s.label()).collect();
            tracing::debug!(scenario = scenario.name(), combo = ?labels, "running combo");

            let outcome = self.run_combo(scenario, &combo).await;
            if let Err(source) = isolation.rewind().await {
                return Err(match outcome {
                    Err(failure) => {
                        tracing::error!(
                            base = %self.base,
                            scenario = scenario.name(),
                            combo = ?labels,
                            %failure,
                            %source,
                            "revert failed after combo failure"
                        );
                        RunnerError::IsolationAfterFailure { failure, source }
                    }
                    Ok(_) => RunnerError::Isolation(source),
                });
            }
            attempted += 1;

            match outcome {
                Ok(receipt) => {
                    total_gas = total_gas.saturating_add(receipt.map_or(0, |r| r.gas_used));
                }
                Err(error) => {
                    tracing::warn!(
                        base = %self.base,
                        scenario = scenario.name(),
                        combo = ?labels,
                        %error,
                        "combo failed"
                    );
                    failure = Some(error);
                    break;
                }
            }
        }

        let gas_used = if attempted == 0 { 0 } else { total_gas / attempted };
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(ScenarioResult {
            base: self.base.clone(),
            file: scenario.location().to_string(),
            scenario: scenario.name().to_string(),
            gas_used,
            num_solution_sets: attempted,
            elapsed,
            error: failure.as_ref().map(ToString::to_string),
            trace: failure.as_ref().map(|e| trace(e)),
            diff: failure.as_ref().and_then(ScenarioError::diff),
            skipped: false,
        })
    }

    async fn run_combo(
        &self,
        scenario: &Scenario<C>,
        combo: &[&Solution<C>],
    ) -> Result<Option<ExecutionReceipt>, ScenarioError> {
        let world = &self.world;
        let requirements = scenario.requirements_spec();

        let mut context = C::initialize(world).await?;
        for solution in combo {
            context = solution.apply(context, Arc::clone(world)).await?;
        }

        for constraint in scenario.constraints() {
            constraint.check(requirements, &context, world).await?;
        }

        let view = context.prepare(world).await?;
        scenario.execute(view, Arc::clone(world)).await
    }
}

impl<C: ScenarioContext> std::fmt::Debug for Runner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").field("base", &self.base).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::expect_eq;
    use crate::scenario::{Constraint, Solutions};
    use crate::types::Requirements;
    use crate::error::WorldError;
    use crate::world::{ActingAs, Checkpoint, SimulatedWorld, World};
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Ctx {
        flavor: String,
    }

    #[async_trait]
    impl ScenarioContext for Ctx {
        type World = SimulatedWorld;

        async fn initialize(_world: &SimulatedWorld) -> Result<Self, ScenarioError> {
            Ok(Ctx {
                flavor: "plain".into(),
            })
        }
    }

    /// Offers one solution per listed flavor
    struct Flavors(Vec<&'static str>);

    #[async_trait]
    impl Constraint<Ctx> for Flavors {
        fn name(&self) -> &str {
            "flavors"
        }

        async fn solve(
            &self,
            _requirements: &Requirements,
            _context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<Solutions<Ctx>, ScenarioError> {
            Ok(Solutions::Many(
                self.0
                    .iter()
                    .map(|&flavor| {
                        Solution::new(flavor, move |_ctx: Ctx, world: Arc<SimulatedWorld>| async move {
                            world.write("touched", json!(true));
                            Ok(Ctx {
                                flavor: flavor.to_string(),
                            })
                        })
                    })
                    .collect(),
            ))
        }

        async fn check(
            &self,
            _requirements: &Requirements,
            context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<(), ScenarioError> {
            if self.0.contains(&context.flavor.as_str()) {
                Ok(())
            } else {
                Err(ScenarioError::ConstraintViolated {
                    constraint: "flavors".into(),
                    reason: format!("unexpected flavor {}", context.flavor),
                })
            }
        }
    }

    struct Unsolvable;

    #[async_trait]
    impl Constraint<Ctx> for Unsolvable {
        fn name(&self) -> &str {
            "unsolvable"
        }

        async fn solve(
            &self,
            _requirements: &Requirements,
            _context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<Solutions<Ctx>, ScenarioError> {
            Err(ScenarioError::failed("no way"))
        }

        async fn check(
            &self,
            _requirements: &Requirements,
            _context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<(), ScenarioError> {
            Ok(())
        }
    }

    fn runner() -> Runner<Ctx> {
        Runner::new("dev", Arc::new(SimulatedWorld::new(1)))
    }

    #[tokio::test]
    async fn zero_constraints_run_once() {
        let scenario = Scenario::<Ctx>::new("baseline", |_, _| async { Ok(Some(ExecutionReceipt::new(21_000))) });
        let result = runner().run(&scenario).await.unwrap();

        assert_eq!(result.num_solution_sets, 1);
        assert_eq!(result.gas_used, 21_000);
        assert!(result.is_pass());
        assert_eq!(result.base, "dev");
    }

    #[tokio::test]
    async fn every_solution_gets_a_combo() {
        let scenario = Scenario::<Ctx>::new("flavors", |ctx, _| async move {
            Ok(Some(ExecutionReceipt::new(if ctx.flavor == "a" { 100 } else { 300 })))
        })
        .constraint(Flavors(vec!["a", "b"]));

        let runner = runner();
        let result = runner.run(&scenario).await.unwrap();

        assert_eq!(result.num_solution_sets, 2);
        assert_eq!(result.gas_used, 200);
        assert_eq!(runner.world().read("touched"), None);
    }

    #[tokio::test]
    async fn first_failure_stops_remaining_combos() {
        let scenario = Scenario::<Ctx>::new("fails-on-b", |ctx, _| async move {
            expect_eq(&ctx.flavor.as_str(), &"a")?;
            Ok(None)
        })
        .constraint(Flavors(vec!["a", "b", "c"]));

        let result = runner().run(&scenario).await.unwrap();

        assert_eq!(result.num_solution_sets, 2);
        assert!(result.is_error());
        let diff = result.diff.unwrap();
        assert_eq!(diff.actual, "\"b\"");
        assert_eq!(diff.expected, "\"a\"");
        assert!(result.trace.unwrap().contains("assertion failed"));
    }

    #[tokio::test]
    async fn solve_failure_aborts_without_result() {
        let scenario = Scenario::<Ctx>::new("unsolvable", |_, _| async { Ok(None) })
            .constraint(Unsolvable);

        let err = runner().run(&scenario).await.unwrap_err();
        assert!(matches!(err, RunnerError::Solve { constraint, .. } if constraint == "unsolvable"));
    }

    #[tokio::test]
    async fn world_is_reverted_after_failure() {
        let scenario = Scenario::<Ctx>::new("dirty", |_, world: Arc<SimulatedWorld>| async move {
            world.write("dirty", json!(1));
            world.increase_time(60).await?;
            Err(ScenarioError::failed("boom"))
        });

        let runner = runner();
        let before = runner.world().timestamp().await.unwrap();
        let result = runner.run(&scenario).await.unwrap();

        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.diff.is_none());
        assert_eq!(runner.world().read("dirty"), None);
        assert_eq!(runner.world().timestamp().await.unwrap(), before);
    }

    /// Offers alternatives, but none of them
    struct NoWay;

    #[async_trait]
    impl Constraint<Ctx> for NoWay {
        fn name(&self) -> &str {
            "no-way"
        }

        async fn solve(
            &self,
            _requirements: &Requirements,
            _context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<Solutions<Ctx>, ScenarioError> {
            Ok(Solutions::Many(Vec::new()))
        }

        async fn check(
            &self,
            _requirements: &Requirements,
            _context: &Ctx,
            _world: &SimulatedWorld,
        ) -> Result<(), ScenarioError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_alternatives_run_no_combo() {
        let scenario = Scenario::<Ctx>::new("unreachable", |_, world: Arc<SimulatedWorld>| async move {
            world.write("body-ran", json!(true));
            Ok(Some(ExecutionReceipt::new(1)))
        })
        .constraint(NoWay);

        let runner = runner();
        let result = runner.run(&scenario).await.unwrap();

        assert_eq!(result.num_solution_sets, 0);
        assert_eq!(result.gas_used, 0);
        assert!(result.error.is_none());
        assert_eq!(runner.world().read("body-ran"), None);
    }

    #[tokio::test]
    async fn gas_total_saturates() {
        let scenario = Scenario::<Ctx>::new("expensive", |_, _| async { Ok(Some(ExecutionReceipt::new(u64::MAX))) })
            .constraint(Flavors(vec!["a", "b"]));

        let result = runner().run(&scenario).await.unwrap();

        assert_eq!(result.num_solution_sets, 2);
        assert_eq!(result.gas_used, u64::MAX / 2);
    }

    /// Simulated world whose reverts always fail
    struct Unrevertable(SimulatedWorld);

    #[async_trait]
    impl World for Unrevertable {
        async fn snapshot(&self) -> Result<Checkpoint, WorldError> {
            self.0.snapshot().await
        }

        async fn revert(&self, _checkpoint: Checkpoint) -> Result<(), WorldError> {
            Err(WorldError::Transport("node went away".into()))
        }

        async fn increase_time(&self, seconds: u64) -> Result<(), WorldError> {
            self.0.increase_time(seconds).await
        }

        async fn timestamp(&self) -> Result<u64, WorldError> {
            self.0.timestamp().await
        }

        async fn impersonate(&self, identity: &str) -> Result<ActingAs, WorldError> {
            self.0.impersonate(identity).await
        }

        async fn chain_id(&self) -> Result<u64, WorldError> {
            self.0.chain_id().await
        }
    }

    #[derive(Debug, Clone)]
    struct UnrevertableCtx;

    #[async_trait]
    impl ScenarioContext for UnrevertableCtx {
        type World = Unrevertable;

        async fn initialize(_world: &Unrevertable) -> Result<Self, ScenarioError> {
            Ok(UnrevertableCtx)
        }
    }

    fn unrevertable_runner() -> Runner<UnrevertableCtx> {
        Runner::new("dev", Arc::new(Unrevertable(SimulatedWorld::new(1))))
    }

    #[tokio::test]
    async fn failed_revert_keeps_combo_failure() {
        let scenario = Scenario::<UnrevertableCtx>::new("boom", |_, _| async { Err(ScenarioError::failed("boom")) });

        let err = unrevertable_runner().run(&scenario).await.unwrap_err();

        match &err {
            RunnerError::IsolationAfterFailure { failure, source } => {
                assert_eq!(failure.to_string(), "boom");
                assert!(matches!(source, WorldError::Transport(_)));
            }
            other => panic!("expected isolation failure carrying the combo error, got {other:?}"),
        }
        assert!(trace(&err).contains("boom"));
    }

    #[tokio::test]
    async fn failed_revert_after_pass_is_plain_isolation_error() {
        let scenario = Scenario::<UnrevertableCtx>::new("fine", |_, _| async { Ok(None) });
        let err = unrevertable_runner().run(&scenario).await.unwrap_err();
        assert!(matches!(err, RunnerError::Isolation(WorldError::Transport(_))));
    }
}
