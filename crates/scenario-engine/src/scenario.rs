//! Scenario, constraint and solution abstractions
//!
//! A [`Scenario`] pairs declarative requirements with a test body.
//! Each [`Constraint`] reads the requirements and proposes [`Solution`]s:
//! alternative ways of bringing a context into compliance. The runner tries
//! every combination.

use crate::error::ScenarioError;
use crate::types::{ExecutionReceipt, Requirements, RunFlag};
use crate::world::World;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Test-visible state a scenario runs against
///
/// The context type fixes the world type, so solutions and test bodies get
/// the concrete world and can use backend-specific helpers.
#[async_trait]
pub trait ScenarioContext: Clone + Send + Sync + 'static {
    /// World this context lives in
    type World: World + 'static;

    /// Build a base context from the world's current state
    async fn initialize(world: &Self::World) -> Result<Self, ScenarioError>;

    /// View handed to the test body; identity by default
    async fn prepare(self, _world: &Self::World) -> Result<Self, ScenarioError> {
        Ok(self)
    }
}

type SolutionFn<C> = dyn Fn(C, Arc<<C as ScenarioContext>::World>) -> BoxFuture<'static, Result<C, ScenarioError>>
    + Send
    + Sync;

/// One way of satisfying one constraint
///
/// Takes the context by value and hands one back, so a solution can either
/// edit it in place or replace it wholesale. Side effects on the world are
/// allowed; they are reverted after the combo.
pub struct Solution<C: ScenarioContext> {
    label: String,
    apply: Arc<SolutionFn<C>>,
}

impl<C: ScenarioContext> Solution<C> {
    /// Create a labelled solution from an async closure
    pub fn new<F, Fut>(label: impl Into<String>, apply: F) -> Self
    where
        F: Fn(C, Arc<C::World>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, ScenarioError>> + Send + 'static,
    {
        let apply: Arc<SolutionFn<C>> =
            Arc::new(move |ctx: C, world: Arc<C::World>| apply(ctx, world).boxed());
        Self {
            label: label.into(),
            apply,
        }
    }

    /// Solution that leaves the context untouched
    #[must_use]
    pub fn identity() -> Self {
        Self::new("identity", |ctx, _world| async move { Ok(ctx) })
    }

    /// Human-readable label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply to a context
    ///
    /// # Errors
    /// Whatever the solution raises.
    pub async fn apply(&self, context: C, world: Arc<C::World>) -> Result<C, ScenarioError> {
        (self.apply)(context, world).await
    }
}

impl<C: ScenarioContext> Clone for Solution<C> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<C: ScenarioContext> fmt::Debug for Solution<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Solution").field(&self.label).finish()
    }
}

/// What a constraint proposes
pub enum Solutions<C: ScenarioContext> {
    /// Nothing to do; equivalent to a single identity solution
    None,
    /// Exactly one way
    One(Solution<C>),
    /// Alternatives, each tried in its own combo; an empty list leaves the
    /// requirement unsatisfiable and no combo runs
    Many(Vec<Solution<C>>),
}

impl<C: ScenarioContext> Solutions<C> {
    /// Normalize into a choice list
    #[must_use]
    pub fn into_choices(self) -> Vec<Solution<C>> {
        match self {
            Self::None => vec![Solution::identity()],
            Self::One(solution) => vec![solution],
            Self::Many(list) => list,
        }
    }
}

impl<C: ScenarioContext> From<Option<Solution<C>>> for Solutions<C> {
    fn from(value: Option<Solution<C>>) -> Self {
        value.map_or(Self::None, Self::One)
    }
}

impl<C: ScenarioContext> From<Vec<Solution<C>>> for Solutions<C> {
    fn from(value: Vec<Solution<C>>) -> Self {
        Self::Many(value)
    }
}

/// Policy that proposes solutions for a requirement and validates compliance
///
/// Constraints are assumed independent: no two constraints of one scenario
/// may fight over the same resource.
#[async_trait]
pub trait Constraint<C: ScenarioContext>: Send + Sync {
    /// Name used in logs and check failures
    fn name(&self) -> &str;

    /// Propose solutions for `requirements`
    async fn solve(
        &self,
        requirements: &Requirements,
        context: &C,
        world: &C::World,
    ) -> Result<Solutions<C>, ScenarioError>;

    /// Confirm that `context` satisfies `requirements`
    async fn check(
        &self,
        requirements: &Requirements,
        context: &C,
        world: &C::World,
    ) -> Result<(), ScenarioError>;
}

type PropertyFn<C> = dyn Fn(C, Arc<<C as ScenarioContext>::World>) -> BoxFuture<'static, Result<Option<ExecutionReceipt>, ScenarioError>>
    + Send
    + Sync;

/// A named test combining requirements, constraints and a test body
pub struct Scenario<C: ScenarioContext> {
    name: String,
    requirements: Requirements,
    property: Arc<PropertyFn<C>>,
    constraints: Vec<Arc<dyn Constraint<C>>>,
    flag: RunFlag,
    location: String,
}

impl<C: ScenarioContext> Scenario<C> {
    /// Create a scenario; the caller's source location is recorded
    #[track_caller]
    pub fn new<F, Fut>(name: impl Into<String>, property: F) -> Self
    where
        F: Fn(C, Arc<C::World>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ExecutionReceipt>, ScenarioError>> + Send + 'static,
    {
        let caller = std::panic::Location::caller();
        let property: Arc<PropertyFn<C>> =
            Arc::new(move |ctx: C, world: Arc<C::World>| property(ctx, world).boxed());
        Self {
            name: name.into(),
            requirements: Requirements::Null,
            property,
            constraints: Vec::new(),
            flag: RunFlag::None,
            location: format!("{}:{}", caller.file(), caller.line()),
        }
    }

    /// With requirements
    #[must_use]
    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Append a constraint
    #[must_use]
    pub fn constraint(mut self, constraint: impl Constraint<C> + 'static) -> Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    /// Append an already shared constraint
    #[must_use]
    pub fn shared_constraint(mut self, constraint: Arc<dyn Constraint<C>>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// With run flag
    #[must_use]
    pub fn flag(mut self, flag: RunFlag) -> Self {
        self.flag = flag;
        self
    }

    /// Run exclusively
    #[must_use]
    pub fn only(self) -> Self {
        self.flag(RunFlag::Only)
    }

    /// Never run
    #[must_use]
    pub fn skip(self) -> Self {
        self.flag(RunFlag::Skip)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn requirements_spec(&self) -> &Requirements {
        &self.requirements
    }

    #[inline]
    #[must_use]
    pub fn constraints(&self) -> &[Arc<dyn Constraint<C>>] {
        &self.constraints
    }

    #[inline]
    #[must_use]
    pub fn run_flag(&self) -> RunFlag {
        self.flag
    }

    /// `file:line` the scenario was created at
    #[inline]
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run the test body
    ///
    /// # Errors
    /// Whatever the test body raises.
    pub async fn execute(
        &self,
        context: C,
        world: Arc<C::World>,
    ) -> Result<Option<ExecutionReceipt>, ScenarioError> {
        (self.property)(context, world).await
    }
}

impl<C: ScenarioContext> fmt::Debug for Scenario<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .field("constraints", &self.constraints.len())
            .field("flag", &self.flag)
            .field("location", &self.location)
            .finish()
    }
}
