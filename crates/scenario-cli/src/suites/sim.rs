//! Token ledger suite over the simulated world

use super::{Clocked, Elapsed};
use async_trait::async_trait;
use scenario_engine::{
    expect_eq, Constraint, ExecutionReceipt, Registry, Requirements, Scenario, ScenarioContext,
    ScenarioError, ScenarioLoader, SimulatedWorld, SimulatedWorldFactory, Solution, Solutions,
    World,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) const TREASURY: &str = "treasury";
const TREASURY_SUPPLY: u64 = 1_000_000;
const SUPPLY_SLOT: &str = "supply";
const TRANSFER_GAS: u64 = 51_000;

/// Cliff used by the vesting scenario
const VESTING_CLIFF: u64 = 30 * 24 * 60 * 60;

fn balance_slot(account: &str) -> String {
    format!("balance:{account}")
}

fn balance_of(world: &SimulatedWorld, account: &str) -> u64 {
    world.read_u64(&balance_slot(account))
}

fn set_balance(world: &SimulatedWorld, account: &str, amount: u64) {
    world.write(balance_slot(account), json!(amount));
}

/// Move `amount` between accounts, failing on overdraft
fn transfer(
    world: &SimulatedWorld,
    from: &str,
    to: &str,
    amount: u64,
) -> Result<ExecutionReceipt, ScenarioError> {
    let available = balance_of(world, from);
    if available < amount {
        return Err(ScenarioError::failed(format!(
            "transfer of {amount} from {from} exceeds balance {available}"
        )));
    }
    set_balance(world, from, available - amount);
    set_balance(world, to, balance_of(world, to) + amount);
    Ok(ExecutionReceipt::new(TRANSFER_GAS))
}

/// Seeds every fresh ledger with the treasury supply
pub(crate) fn factory() -> SimulatedWorldFactory {
    SimulatedWorldFactory::default().with_genesis(|world| {
        set_balance(world, TREASURY, TREASURY_SUPPLY);
        world.write(SUPPLY_SLOT, json!(TREASURY_SUPPLY));
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LedgerContext {
    pub(crate) actor: String,
    pub(crate) started_at: u64,
}

#[async_trait]
impl ScenarioContext for LedgerContext {
    type World = SimulatedWorld;

    async fn initialize(world: &SimulatedWorld) -> Result<Self, ScenarioError> {
        Ok(Self {
            actor: "alice".into(),
            started_at: world.timestamp().await?,
        })
    }
}

impl Clocked for LedgerContext {
    fn started_at(&self) -> u64 {
        self.started_at
    }
}

/// Requires the actor to hold `{"balance": n}`
///
/// Either mints fresh tokens or pays out of the treasury.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Funded;

fn balance_requirement(requirements: &Requirements) -> Option<u64> {
    requirements
        .get("balance")
        .and_then(serde_json::Value::as_u64)
        .filter(|&n| n > 0)
}

#[async_trait]
impl Constraint<LedgerContext> for Funded {
    fn name(&self) -> &str {
        "funded"
    }

    async fn solve(
        &self,
        requirements: &Requirements,
        _context: &LedgerContext,
        _world: &SimulatedWorld,
    ) -> Result<Solutions<LedgerContext>, ScenarioError> {
        let Some(amount) = balance_requirement(requirements) else {
            return Ok(Solutions::None);
        };

        let mint = Solution::new("mint", move |ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            set_balance(&world, &ctx.actor, balance_of(&world, &ctx.actor) + amount);
            world.write(SUPPLY_SLOT, json!(world.read_u64(SUPPLY_SLOT) + amount));
            Ok(ctx)
        });
        let payout = Solution::new("treasury-payout", move |ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            world.impersonate(TREASURY).await?;
            transfer(&world, TREASURY, &ctx.actor, amount)?;
            Ok(ctx)
        });
        Ok(Solutions::Many(vec![mint, payout]))
    }

    async fn check(
        &self,
        requirements: &Requirements,
        context: &LedgerContext,
        world: &SimulatedWorld,
    ) -> Result<(), ScenarioError> {
        let Some(amount) = balance_requirement(requirements) else {
            return Ok(());
        };
        let held = balance_of(world, &context.actor);
        if held >= amount {
            Ok(())
        } else {
            Err(ScenarioError::ConstraintViolated {
                constraint: "funded".into(),
                reason: format!("{} holds {held}, needs {amount}", context.actor),
            })
        }
    }
}

/// Requires `{"as": account}`: the context acts as that account
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActingAccount;

#[async_trait]
impl Constraint<LedgerContext> for ActingAccount {
    fn name(&self) -> &str {
        "acting-account"
    }

    async fn solve(
        &self,
        requirements: &Requirements,
        _context: &LedgerContext,
        _world: &SimulatedWorld,
    ) -> Result<Solutions<LedgerContext>, ScenarioError> {
        let Some(account) = requirements.get("as").and_then(|v| v.as_str()).map(str::to_string) else {
            return Ok(Solutions::None);
        };
        Ok(Solutions::One(Solution::new(
            "impersonate",
            move |mut ctx: LedgerContext, world: Arc<SimulatedWorld>| {
                let account = account.clone();
                async move {
                    world.impersonate(&account).await?;
                    ctx.actor = account;
                    Ok(ctx)
                }
            },
        )))
    }

    async fn check(
        &self,
        requirements: &Requirements,
        context: &LedgerContext,
        world: &SimulatedWorld,
    ) -> Result<(), ScenarioError> {
        match requirements.get("as").and_then(|v| v.as_str()) {
            Some(account) if context.actor != account || !world.is_impersonating(account) => {
                Err(ScenarioError::ConstraintViolated {
                    constraint: "acting-account".into(),
                    reason: format!("not acting as {account}"),
                })
            }
            _ => Ok(()),
        }
    }
}

fn register_all(registry: &mut Registry<LedgerContext>) -> Result<(), scenario_engine::RegistryError> {
    registry.register(
        Scenario::new("transfer moves balance", |ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            let before = balance_of(&world, &ctx.actor);
            let receipt = transfer(&world, &ctx.actor, "bob", 200)?;
            expect_eq(&balance_of(&world, "bob"), &200)?;
            expect_eq(&balance_of(&world, &ctx.actor), &(before - 200))?;
            Ok(Some(receipt))
        })
        .requirements(json!({ "balance": 500 }))
        .constraint(Funded),
    )?;

    registry.register(
        Scenario::new("supply covers every balance", |ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            let held = balance_of(&world, TREASURY) + balance_of(&world, &ctx.actor);
            expect_eq(&held, &world.read_u64(SUPPLY_SLOT))?;
            Ok(None)
        })
        .requirements(json!({ "balance": 1_000, "as": "carol" }))
        .constraint(ActingAccount)
        .constraint(Funded),
    )?;

    registry.register(
        Scenario::new("vesting unlocks after cliff", |ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            let unlocked = world.timestamp().await? >= ctx.started_at + VESTING_CLIFF;
            expect_eq(&unlocked, &true)?;
            let receipt = transfer(&world, TREASURY, &ctx.actor, 10)?;
            Ok(Some(receipt))
        })
        .requirements(json!({ "elapsed": VESTING_CLIFF }))
        .constraint(Elapsed),
    )?;

    registry.register(Scenario::new(
        "overdraft is rejected",
        |_ctx: LedgerContext, world: Arc<SimulatedWorld>| async move {
            match transfer(&world, "dave", "bob", 1) {
                Ok(_) => Err(ScenarioError::failed("overdraft was accepted")),
                Err(_) => {
                    expect_eq(&balance_of(&world, "bob"), &0)?;
                    Ok(None)
                }
            }
        },
    ))?;

    Ok(())
}

/// Static registration pass for the ledger suite
pub(crate) fn loader() -> ScenarioLoader<LedgerContext> {
    Arc::new(register_all)
}
