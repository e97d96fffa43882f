//! Node suite for bases with a JSON-RPC endpoint

use super::{Clocked, Elapsed};
use async_trait::async_trait;
use scenario_engine::{
    expect_eq, parse_quantity, Registry, RegistryError, RpcWorld, RpcWorldFactory, Scenario,
    ScenarioContext, ScenarioError, ScenarioLoader, World,
};
use serde_json::json;
use std::sync::Arc;

/// Block number of the latest block
async fn block_number(world: &RpcWorld) -> Result<u64, ScenarioError> {
    let raw: String = world.call("eth_blockNumber", json!([])).await?;
    Ok(parse_quantity("eth_blockNumber", &raw)?)
}

/// Node factory; with a fork source every node is reset to the base's block
pub(crate) fn factory(fork_source: Option<&str>) -> RpcWorldFactory {
    match fork_source {
        Some(source) => RpcWorldFactory::new().with_fork_source(source),
        None => RpcWorldFactory::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeContext {
    pub(crate) chain_id: u64,
    pub(crate) started_at: u64,
}

#[async_trait]
impl ScenarioContext for NodeContext {
    type World = RpcWorld;

    async fn initialize(world: &RpcWorld) -> Result<Self, ScenarioError> {
        Ok(Self {
            chain_id: world.chain_id().await?,
            started_at: world.timestamp().await?,
        })
    }
}

impl Clocked for NodeContext {
    fn started_at(&self) -> u64 {
        self.started_at
    }
}

fn register_all(registry: &mut Registry<NodeContext>) -> Result<(), RegistryError> {
    registry.register(Scenario::new(
        "chain id survives checkpoints",
        |ctx: NodeContext, world: Arc<RpcWorld>| async move {
            let checkpoint = world.snapshot().await?;
            world.increase_time(1).await?;
            world.revert(checkpoint).await?;
            expect_eq(&world.chain_id().await?, &ctx.chain_id)?;
            Ok(None)
        },
    ))?;

    registry.register(
        Scenario::new("time travel mines a block", |ctx: NodeContext, world: Arc<RpcWorld>| async move {
            let now = world.timestamp().await?;
            expect_eq(&(now >= ctx.started_at + 3_600), &true)?;
            let before = block_number(&world).await?;
            world.increase_time(1).await?;
            expect_eq(&block_number(&world).await?, &(before + 1))?;
            Ok(None)
        })
        .requirements(json!({ "elapsed": 3_600 }))
        .constraint(Elapsed),
    )?;

    Ok(())
}

/// Static registration pass for the node suite
pub(crate) fn loader() -> ScenarioLoader<NodeContext> {
    Arc::new(register_all)
}
