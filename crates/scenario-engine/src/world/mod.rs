//! Target environment ("World") contract
//!
//! A World wraps one running instance of the system under test. The engine
//! only consumes its checkpoint, time-control and impersonation primitives.
//!
//! # Checkpoints
//!
//! A [`Checkpoint`] is single-use: [`World::revert`] takes it by value, so a
//! restored checkpoint cannot be reverted to again. [`Isolation`] owns the one
//! live checkpoint of a scenario run and re-snapshots right after every
//! revert.

mod rpc;
mod simulated;

pub use rpc::{parse_quantity, RpcWorld, RpcWorldFactory};
pub use simulated::{SimulatedWorld, SimulatedWorldFactory};

use crate::config::{ForkSpec, RuntimeArgs};
use crate::error::WorldError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque, single-use restore token
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a checkpoint is useless unless reverted to"]
pub struct Checkpoint(String);

impl Checkpoint {
    /// Wrap a backend-issued snapshot id
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Backend snapshot id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Consume the checkpoint, yielding its id
    #[inline]
    #[must_use]
    pub fn into_id(self) -> String {
        self.0
    }
}

/// Identity a world is currently acting as after impersonation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActingAs {
    pub identity: String,
}

/// One running instance of the system under test
///
/// Every operation may suspend on network or disk I/O.
#[async_trait]
pub trait World: Send + Sync {
    /// Take a checkpoint of the current state
    async fn snapshot(&self) -> Result<Checkpoint, WorldError>;

    /// Restore the state captured by `checkpoint`, invalidating it
    async fn revert(&self, checkpoint: Checkpoint) -> Result<(), WorldError>;

    /// Advance the clock
    async fn increase_time(&self, seconds: u64) -> Result<(), WorldError>;

    /// Current block timestamp in seconds
    async fn timestamp(&self) -> Result<u64, WorldError>;

    /// Act as `identity` for subsequent calls
    async fn impersonate(&self, identity: &str) -> Result<ActingAs, WorldError>;

    /// Chain identifier
    async fn chain_id(&self) -> Result<u64, WorldError>;
}

/// Produces a fresh, logically independent World for each worker
#[async_trait]
pub trait WorldFactory<W: World>: Send + Sync {
    /// Connect to (or spin up) the world for `base`
    async fn connect(&self, base: &ForkSpec, args: &RuntimeArgs) -> Result<W, WorldError>;
}

/// Scoped holder of exactly one live checkpoint
///
/// [`rewind`](Self::rewind) restores the world and immediately takes the
/// next checkpoint, so callers never touch a consumed one.
pub struct Isolation<'w, W: World + ?Sized> {
    world: &'w W,
    checkpoint: Option<Checkpoint>,
}

impl<'w, W: World + ?Sized> Isolation<'w, W> {
    /// Take the initial checkpoint
    ///
    /// # Errors
    /// Propagates the world's snapshot failure.
    pub async fn acquire(world: &'w W) -> Result<Self, WorldError> {
        let checkpoint = world.snapshot().await?;
        tracing::trace!(checkpoint = checkpoint.id(), "checkpoint acquired");
        Ok(Self {
            world,
            checkpoint: Some(checkpoint),
        })
    }

    /// Restore the world to the live checkpoint and re-snapshot
    ///
    /// # Errors
    /// If the revert or the following snapshot fails the isolation is broken
    /// and every further `rewind` fails too.
    pub async fn rewind(&mut self) -> Result<(), WorldError> {
        let checkpoint = self
            .checkpoint
            .take()
            .ok_or_else(|| WorldError::UnknownCheckpoint("isolation already broken".into()))?;
        tracing::trace!(checkpoint = checkpoint.id(), "reverting");
        self.world.revert(checkpoint).await?;
        self.checkpoint = Some(self.world.snapshot().await?);
        Ok(())
    }

    /// Id of the live checkpoint, if any
    #[inline]
    #[must_use]
    pub fn checkpoint_id(&self) -> Option<&str> {
        self.checkpoint.as_ref().map(Checkpoint::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rewind_restores_and_resnapshots() {
        let world = SimulatedWorld::new(1);
        world.write("counter", json!(0));

        let mut isolation = Isolation::acquire(&world).await.unwrap();
        let first = isolation.checkpoint_id().unwrap().to_string();

        world.write("counter", json!(5));
        isolation.rewind().await.unwrap();
        assert_eq!(world.read("counter"), Some(json!(0)));

        let second = isolation.checkpoint_id().unwrap().to_string();
        assert_ne!(first, second);

        world.write("counter", json!(9));
        isolation.rewind().await.unwrap();
        assert_eq!(world.read("counter"), Some(json!(0)));
    }

    #[tokio::test]
    async fn checkpoint_is_single_use() {
        let world = SimulatedWorld::new(1);
        let checkpoint = world.snapshot().await.unwrap();
        let id = checkpoint.id().to_string();
        world.revert(checkpoint).await.unwrap();

        let replay = Checkpoint::new(id);
        assert!(matches!(
            world.revert(replay).await,
            Err(WorldError::UnknownCheckpoint(_))
        ));
    }
}
