//! Built-in scenario suites
//!
//! `sim` runs against bases without a node URL, `rpc` against live or
//! forked nodes.

pub(crate) mod rpc;
pub(crate) mod sim;

use async_trait::async_trait;
use scenario_engine::{
    Constraint, Requirements, ScenarioContext, ScenarioError, Solution, Solutions, World,
};
use std::sync::Arc;

/// Contexts that remember the clock at initialization
pub(crate) trait Clocked {
    fn started_at(&self) -> u64;
}

/// Requires `{"elapsed": seconds}` of chain time since initialization
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Elapsed;

fn elapsed_requirement(requirements: &Requirements) -> Option<u64> {
    requirements.get("elapsed").and_then(serde_json::Value::as_u64)
}

#[async_trait]
impl<C> Constraint<C> for Elapsed
where
    C: ScenarioContext + Clocked,
{
    fn name(&self) -> &str {
        "elapsed"
    }

    async fn solve(
        &self,
        requirements: &Requirements,
        _context: &C,
        _world: &C::World,
    ) -> Result<Solutions<C>, ScenarioError> {
        let Some(seconds) = elapsed_requirement(requirements) else {
            return Ok(Solutions::None);
        };
        Ok(Solutions::One(Solution::new(
            "warp",
            move |ctx: C, world: Arc<C::World>| async move {
                world.increase_time(seconds).await?;
                Ok(ctx)
            },
        )))
    }

    async fn check(
        &self,
        requirements: &Requirements,
        context: &C,
        world: &C::World,
    ) -> Result<(), ScenarioError> {
        let Some(seconds) = elapsed_requirement(requirements) else {
            return Ok(());
        };
        let now = world.timestamp().await?;
        if now >= context.started_at() + seconds {
            Ok(())
        } else {
            Err(ScenarioError::ConstraintViolated {
                constraint: "elapsed".into(),
                reason: format!("only {}s of {seconds}s elapsed", now.saturating_sub(context.started_at())),
            })
        }
    }
}
