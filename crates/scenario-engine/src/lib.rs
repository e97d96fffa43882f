//! Scenario Engine - combinatorial scenario testing against forkable worlds
//!
//! The engine:
//! - Lets test authors declare scenarios as requirements plus a test body
//! - Asks pluggable constraints for alternative ways to satisfy requirements
//! - Executes every combination of solutions, each from the same checkpoint
//! - Distributes scenarios over a pool of workers, one world per worker
//! - Aggregates per-scenario results into console or JSON reports
//!
//! # Example
//!
//! ```rust,ignore
//! use scenario_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let loader: ScenarioLoader<MyContext> = Arc::new(|registry: &mut Registry<MyContext>| {
//!     registry.register(Scenario::new("transfer", |ctx, world| async move {
//!         // drive the world, assert on the outcome
//!         Ok(None)
//!     }))
//! });
//!
//! let results = Orchestrator::new(loader, Arc::new(SimulatedWorldFactory::default()))
//!     .with_workers(4)
//!     .run(&[ForkSpec::new("development")])
//!     .await?;
//!
//! println!("{}", Summary::of(&results));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod combo;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod types;
pub mod worker;
pub mod world;

// Re-exports for convenience
pub use combo::Combos;
pub use config::{EngineConfig, ForkSpec, ReportConfig, ReportFormat, RuntimeArgs, WORKER_PLACEHOLDER};
pub use error::{
    expect_eq, trace, ConfigError, PoolError, RegistryError, ReportError, RunnerError,
    ScenarioError, WorldError,
};
pub use orchestrator::{Orchestrator, Orphan, PoolRun};
pub use registry::{Registry, ScenarioLoader, Selection};
pub use report::{exit_code, Reporter, Summary};
pub use runner::Runner;
pub use scenario::{Constraint, Scenario, ScenarioContext, Solution, Solutions};
pub use types::{Diff, ExecutionReceipt, Requirements, RunFlag, ScenarioResult};
pub use worker::{ParentMessage, Worker, WorkerHandle, WorkerMessage};
pub use world::{
    parse_quantity, ActingAs, Checkpoint, Isolation, RpcWorld, RpcWorldFactory, SimulatedWorld,
    SimulatedWorldFactory, World, WorldFactory,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing scenarios and constraints
    pub use crate::{
        expect_eq, Constraint, ExecutionReceipt, ForkSpec, Orchestrator, Registry, Requirements,
        Scenario, ScenarioContext, ScenarioError, ScenarioLoader, ScenarioResult,
        SimulatedWorld, SimulatedWorldFactory, Solution, Solutions, Summary, World,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
