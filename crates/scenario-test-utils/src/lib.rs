//! Testing utilities for the scenario engine workspace
//!
//! Shared contexts, constraints and scenario builders over the in-memory
//! [`SimulatedWorld`].

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use scenario_engine::{
    Constraint, ExecutionReceipt, Registry, Requirements, Scenario, ScenarioContext,
    ScenarioError, ScenarioLoader, SimulatedWorld, SimulatedWorldFactory, Solution, Solutions,
    WorldFactory,
};
use serde_json::json;
use std::sync::Arc;

/// Storage slot every solution bumps; non-zero at combo start means leaked state
pub const COUNTER_SLOT: &str = "counter";

/// Context that remembers which solutions were applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterContext {
    /// Counter value seen at initialization
    pub counter: u64,
    /// Labels of applied solutions, in order
    pub applied: Vec<String>,
}

#[async_trait]
impl ScenarioContext for CounterContext {
    type World = SimulatedWorld;

    async fn initialize(world: &SimulatedWorld) -> Result<Self, ScenarioError> {
        Ok(Self {
            counter: world.read_u64(COUNTER_SLOT),
            applied: Vec::new(),
        })
    }
}

/// Offers one solution per choice; each bumps [`COUNTER_SLOT`] and records
/// its label
#[derive(Debug, Clone)]
pub struct ChoiceConstraint {
    name: String,
    choices: Vec<String>,
}

impl ChoiceConstraint {
    pub fn new(name: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            choices: choices.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl Constraint<CounterContext> for ChoiceConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn solve(
        &self,
        _requirements: &Requirements,
        _context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<Solutions<CounterContext>, ScenarioError> {
        let solutions = self
            .choices
            .iter()
            .map(|choice| {
                let label = format!("{}:{choice}", self.name);
                let recorded = label.clone();
                Solution::new(label, move |mut ctx: CounterContext, world: Arc<SimulatedWorld>| {
                    let recorded = recorded.clone();
                    async move {
                        let next = world.read_u64(COUNTER_SLOT) + 1;
                        world.write(COUNTER_SLOT, json!(next));
                        ctx.applied.push(recorded);
                        Ok(ctx)
                    }
                })
            })
            .collect();
        Ok(Solutions::Many(solutions))
    }

    async fn check(
        &self,
        _requirements: &Requirements,
        context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<(), ScenarioError> {
        let prefix = format!("{}:", self.name);
        if context.applied.iter().any(|label| label.starts_with(&prefix)) {
            Ok(())
        } else {
            Err(ScenarioError::ConstraintViolated {
                constraint: self.name.clone(),
                reason: "no choice applied".into(),
            })
        }
    }
}

/// Proposes nothing and accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConstraint;

#[async_trait]
impl Constraint<CounterContext> for NoopConstraint {
    fn name(&self) -> &str {
        "noop"
    }

    async fn solve(
        &self,
        _requirements: &Requirements,
        _context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<Solutions<CounterContext>, ScenarioError> {
        Ok(Solutions::None)
    }

    async fn check(
        &self,
        _requirements: &Requirements,
        _context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }
}

/// Fails while proposing solutions
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsolvableConstraint;

#[async_trait]
impl Constraint<CounterContext> for UnsolvableConstraint {
    fn name(&self) -> &str {
        "unsolvable"
    }

    async fn solve(
        &self,
        _requirements: &Requirements,
        _context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<Solutions<CounterContext>, ScenarioError> {
        Err(ScenarioError::failed("no solution exists"))
    }

    async fn check(
        &self,
        _requirements: &Requirements,
        _context: &CounterContext,
        _world: &SimulatedWorld,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }
}

/// Observed combos, one entry per executed test body
pub type ComboLog = Arc<Mutex<Vec<Vec<String>>>>;

pub fn combo_log() -> ComboLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Scenario that records every combo it sees and fails on leaked state
///
/// The counter at context initialization must be zero: any other value
/// means a previous combo's writes survived the revert.
#[track_caller]
pub fn recording(name: &str, log: &ComboLog) -> Scenario<CounterContext> {
    let log = Arc::clone(log);
    Scenario::new(name, move |ctx: CounterContext, world: Arc<SimulatedWorld>| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(ctx.applied.clone());
            if ctx.counter != 0 {
                return Err(ScenarioError::assertion("counter leaked between combos", &ctx.counter, &0u64));
            }
            let applied = u64::try_from(ctx.applied.len()).unwrap_or(u64::MAX);
            let counter = world.read_u64(COUNTER_SLOT);
            if counter != applied {
                return Err(ScenarioError::assertion("counter does not match applied solutions", &counter, &applied));
            }
            Ok(Some(ExecutionReceipt::new(21_000 * (applied + 1))))
        }
    })
}

/// Scenario whose test body always succeeds
#[track_caller]
pub fn passing(name: &str) -> Scenario<CounterContext> {
    Scenario::new(name, |_, _| async { Ok(Some(ExecutionReceipt::new(21_000))) })
}

/// Scenario whose test body always fails with `message`
#[track_caller]
pub fn failing(name: &str, message: &str) -> Scenario<CounterContext> {
    let message = message.to_string();
    Scenario::new(name, move |_, _| {
        let message = message.clone();
        async move { Err(ScenarioError::failed(message)) }
    })
}

/// Scenario that asserts `actual == expected`
#[track_caller]
pub fn asserting(name: &str, actual: u64, expected: u64) -> Scenario<CounterContext> {
    Scenario::new(name, move |_, _| async move {
        scenario_engine::expect_eq(&actual, &expected)?;
        Ok(None)
    })
}

/// Loader that registers whatever `build` returns, in order
pub fn loader<F>(build: F) -> ScenarioLoader<CounterContext>
where
    F: Fn() -> Vec<Scenario<CounterContext>> + Send + Sync + 'static,
{
    Arc::new(move |registry: &mut Registry<CounterContext>| {
        for scenario in build() {
            registry.register(scenario)?;
        }
        Ok(())
    })
}

pub fn simulated_factory() -> Arc<dyn WorldFactory<SimulatedWorld>> {
    Arc::new(SimulatedWorldFactory::default())
}
