//! Pool worker and the parent/worker message protocol
//!
//! A worker owns one registry copy, one world connection and one runner.
//! It is driven entirely by [`ParentMessage`]s and answers with
//! [`WorkerMessage`]s; nothing but plain data crosses the channel.

use crate::config::{ForkSpec, RuntimeArgs};
use crate::error::PoolError;
use crate::registry::{Registry, ScenarioLoader};
use crate::runner::Runner;
use crate::scenario::ScenarioContext;
use crate::types::ScenarioResult;
use crate::world::WorldFactory;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Inbox capacity per worker
const INBOX_CAPACITY: usize = 16;

/// Parent to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentMessage {
    /// Bootstrap the worker's world; sent once, first
    Config { base: ForkSpec, args: RuntimeArgs },
    /// Run the named scenario
    Scenario { name: String },
    /// Stop after the current message
    Shutdown,
}

/// Worker to parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMessage {
    /// One finished (passed or failed) scenario
    Result { worker: usize, result: ScenarioResult },
}

/// Parent-side handle of a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    sender: mpsc::Sender<ParentMessage>,
}

impl WorkerHandle {
    /// Send a message to the worker
    ///
    /// # Errors
    /// `PoolError::CommunicationFailed` if the worker has exited.
    pub async fn send(&self, message: ParentMessage) -> Result<(), PoolError> {
        self.sender.send(message).await.map_err(|_| {
            PoolError::CommunicationFailed(format!("worker {} inbox closed", self.index))
        })
    }

    /// Pool slot of this worker
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// One parallel execution unit
pub struct Worker<C: ScenarioContext> {
    index: usize,
    registry: Registry<C>,
    factory: Arc<dyn WorldFactory<C::World>>,
    runner: Option<Runner<C>>,
    outbox: mpsc::Sender<WorkerMessage>,
}

impl<C: ScenarioContext> Worker<C> {
    /// Create a worker with its own registry copy
    ///
    /// # Errors
    /// `PoolError::Registry` if the loader fails.
    pub fn new(
        index: usize,
        loader: &ScenarioLoader<C>,
        factory: Arc<dyn WorldFactory<C::World>>,
        outbox: mpsc::Sender<WorkerMessage>,
    ) -> Result<Self, PoolError> {
        Ok(Self {
            index,
            registry: Registry::load(loader)?,
            factory,
            runner: None,
            outbox,
        })
    }

    /// Spawn a worker task; the task yields its slot and exit status
    pub fn spawn(
        index: usize,
        loader: ScenarioLoader<C>,
        factory: Arc<dyn WorldFactory<C::World>>,
        outbox: mpsc::Sender<WorkerMessage>,
    ) -> (WorkerHandle, JoinHandle<(usize, Result<(), PoolError>)>) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let task = tokio::spawn(async move {
            let status = match Self::new(index, &loader, factory, outbox) {
                Ok(worker) => worker.run(inbox).await,
                Err(error) => Err(error),
            };
            (index, status)
        });
        (WorkerHandle { index, sender }, task)
    }

    /// Process messages until shutdown, inbox closure or a fatal error
    ///
    /// # Errors
    /// The first error raised while handling a message. The error is
    /// returned one scheduling tick after it happened so buffered output
    /// can drain first.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<ParentMessage>) -> Result<(), PoolError> {
        while let Some(message) = inbox.recv().await {
            match self.handle(message).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(error) => {
                    tracing::error!(worker = self.index, %error, "worker terminating");
                    tokio::task::yield_now().await;
                    return Err(error);
                }
            }
        }
        tracing::debug!(worker = self.index, "worker stopped");
        Ok(())
    }

    /// Handle one message
    ///
    /// # Errors
    /// - `PoolError::Bootstrap` if the world cannot be connected
    /// - `PoolError::NotConfigured` for work before config
    /// - `PoolError::Registry` for unknown scenario names
    /// - `PoolError::Runner` if the runner aborts the scenario
    /// - `PoolError::CommunicationFailed` if the parent is gone
    pub async fn handle(&mut self, message: ParentMessage) -> Result<ControlFlow<()>, PoolError> {
        match message {
            ParentMessage::Config { base, args } => {
                let world = self
                    .factory
                    .connect(&base, &args)
                    .await
                    .map_err(|source| PoolError::Bootstrap {
                        worker: self.index,
                        source,
                    })?;
                tracing::debug!(worker = self.index, base = %base.name, "worker configured");
                self.runner = Some(Runner::new(base.name, Arc::new(world)));
            }
            ParentMessage::Scenario { name } => {
                let runner = self
                    .runner
                    .as_ref()
                    .ok_or(PoolError::NotConfigured(self.index))?;
                let scenario = self.registry.require(&name)?;

                tracing::info!(worker = self.index, base = runner.base(), scenario = %name, "running scenario");
                let result = runner.run(scenario).await?;

                tokio::task::yield_now().await;
                self.outbox
                    .send(WorkerMessage::Result {
                        worker: self.index,
                        result,
                    })
                    .await
                    .map_err(|_| PoolError::CommunicationFailed("parent outbox closed".into()))?;
            }
            ParentMessage::Shutdown => return Ok(ControlFlow::Break(())),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// The worker's runner, once configured
    #[inline]
    #[must_use]
    pub fn runner(&self) -> Option<&Runner<C>> {
        self.runner.as_ref()
    }
}
