//! In-memory ledger world
//!
//! Mirrors development-node semantics: snapshots are numbered, and reverting
//! to snapshot `n` discards `n` and every snapshot taken after it.

use super::{ActingAs, Checkpoint, World, WorldFactory};
use crate::config::{ForkSpec, RuntimeArgs};
use crate::error::WorldError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Default genesis timestamp (2022-01-01T00:00:00Z)
const GENESIS_TIMESTAMP: u64 = 1_640_995_200;

#[derive(Debug, Clone, Default, PartialEq)]
struct LedgerState {
    storage: BTreeMap<String, Value>,
    timestamp: u64,
    block_number: u64,
    impersonated: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    state: LedgerState,
    snapshots: BTreeMap<u64, LedgerState>,
    next_snapshot: u64,
}

/// In-memory world backed by a key/value ledger
#[derive(Debug)]
pub struct SimulatedWorld {
    chain_id: u64,
    inner: Mutex<Inner>,
}

impl SimulatedWorld {
    /// Create an empty ledger
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        let state = LedgerState {
            timestamp: GENESIS_TIMESTAMP,
            ..LedgerState::default()
        };
        Self {
            chain_id,
            inner: Mutex::new(Inner {
                state,
                snapshots: BTreeMap::new(),
                next_snapshot: 1,
            }),
        }
    }

    /// Start at a given block height
    #[must_use]
    pub fn at_block(self, block_number: u64) -> Self {
        self.inner.lock().state.block_number = block_number;
        self
    }

    /// Read a storage slot
    #[must_use]
    pub fn read(&self, key: &str) -> Option<Value> {
        self.inner.lock().state.storage.get(key).cloned()
    }

    /// Read a storage slot as an integer, defaulting to zero
    #[must_use]
    pub fn read_u64(&self, key: &str) -> u64 {
        self.read(key).and_then(|v| v.as_u64()).unwrap_or(0)
    }

    /// Write a storage slot
    pub fn write(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().state.storage.insert(key.into(), value);
    }

    /// Remove a storage slot, returning its previous value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().state.storage.remove(key)
    }

    /// Mine one block
    pub fn mine(&self) {
        let mut inner = self.inner.lock();
        inner.state.block_number = inner.state.block_number.saturating_add(1);
    }

    /// Current block height
    #[must_use]
    pub fn block_number(&self) -> u64 {
        self.inner.lock().state.block_number
    }

    /// Whether `identity` is currently impersonated
    #[must_use]
    pub fn is_impersonating(&self, identity: &str) -> bool {
        self.inner.lock().state.impersonated.contains(identity)
    }

    /// Number of checkpoints that can still be reverted to
    #[must_use]
    pub fn live_snapshots(&self) -> usize {
        self.inner.lock().snapshots.len()
    }
}

#[async_trait]
impl World for SimulatedWorld {
    async fn snapshot(&self) -> Result<Checkpoint, WorldError> {
        let mut inner = self.inner.lock();
        let id = inner.next_snapshot;
        inner.next_snapshot += 1;
        let state = inner.state.clone();
        inner.snapshots.insert(id, state);
        Ok(Checkpoint::new(format!("{id:#x}")))
    }

    async fn revert(&self, checkpoint: Checkpoint) -> Result<(), WorldError> {
        let id = checkpoint.into_id();
        let parsed = u64::from_str_radix(id.trim_start_matches("0x"), 16)
            .map_err(|_| WorldError::UnknownCheckpoint(id.clone()))?;

        let mut inner = self.inner.lock();
        let state = inner
            .snapshots
            .remove(&parsed)
            .ok_or(WorldError::UnknownCheckpoint(id))?;
        inner.snapshots.retain(|&k, _| k < parsed);
        inner.state = state;
        Ok(())
    }

    async fn increase_time(&self, seconds: u64) -> Result<(), WorldError> {
        let mut inner = self.inner.lock();
        inner.state.timestamp = inner.state.timestamp.saturating_add(seconds);
        inner.state.block_number = inner.state.block_number.saturating_add(1);
        Ok(())
    }

    async fn timestamp(&self) -> Result<u64, WorldError> {
        Ok(self.inner.lock().state.timestamp)
    }

    async fn impersonate(&self, identity: &str) -> Result<ActingAs, WorldError> {
        self.inner
            .lock()
            .state
            .impersonated
            .insert(identity.to_string());
        Ok(ActingAs {
            identity: identity.to_string(),
        })
    }

    async fn chain_id(&self) -> Result<u64, WorldError> {
        Ok(self.chain_id)
    }
}

type Genesis = Arc<dyn Fn(&SimulatedWorld) + Send + Sync>;

/// Builds one fresh [`SimulatedWorld`] per worker
#[derive(Clone)]
pub struct SimulatedWorldFactory {
    chain_id: u64,
    genesis: Option<Genesis>,
}

impl std::fmt::Debug for SimulatedWorldFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedWorldFactory")
            .field("chain_id", &self.chain_id)
            .field("genesis", &self.genesis.is_some())
            .finish()
    }
}

impl SimulatedWorldFactory {
    /// Create a factory for the given chain id
    #[inline]
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            genesis: None,
        }
    }

    /// Seed every new world with `genesis`
    #[must_use]
    pub fn with_genesis(mut self, genesis: impl Fn(&SimulatedWorld) + Send + Sync + 'static) -> Self {
        self.genesis = Some(Arc::new(genesis));
        self
    }
}

impl Default for SimulatedWorldFactory {
    fn default() -> Self {
        Self::new(1337)
    }
}

#[async_trait]
impl WorldFactory<SimulatedWorld> for SimulatedWorldFactory {
    async fn connect(
        &self,
        base: &ForkSpec,
        args: &RuntimeArgs,
    ) -> Result<SimulatedWorld, WorldError> {
        let world = SimulatedWorld::new(self.chain_id).at_block(base.block_number.unwrap_or(0));
        if let Some(genesis) = &self.genesis {
            genesis(&world);
        }
        if args.spider {
            tracing::debug!(base = %base.name, "simulated world has no deployments to crawl");
        }
        Ok(world)
    }
}
