//! Parent side of the worker pool
//!
//! Per base the orchestrator:
//! - loads the scenario set and partitions it by run flag
//! - spins up the pool and sends every worker its config
//! - hands out one scenario per idle worker (pull-based)
//! - collects results until nothing is pending
//!
//! A worker that dies keeps its in-flight scenario pending; it is neither
//! reassigned nor reported. When no live worker is left busy the base ends
//! early and the [`PoolRun`] lists those scenarios as orphans next to every
//! result that did complete.

use crate::config::{ForkSpec, RuntimeArgs};
use crate::error::PoolError;
use crate::registry::{Registry, ScenarioLoader};
use crate::scenario::ScenarioContext;
use crate::types::ScenarioResult;
use crate::worker::{ParentMessage, Worker, WorkerHandle, WorkerMessage};
use crate::world::WorldFactory;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Scenario left without a result because its worker died
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub base: String,
    pub scenario: String,
}

/// Everything a pool produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolRun {
    /// Completed and skipped results, in arrival order per base
    pub results: Vec<ScenarioResult>,
    /// Scenarios that never produced a result
    pub orphaned: Vec<Orphan>,
}

impl PoolRun {
    /// Whether every selected scenario produced a result
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.orphaned.is_empty()
    }

    /// Append another base's outcome
    pub fn merge(&mut self, other: PoolRun) {
        self.results.extend(other.results);
        self.orphaned.extend(other.orphaned);
    }

    /// Process exit status: 1 if any result failed or any scenario was orphaned
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_complete() {
            crate::report::exit_code(&self.results)
        } else {
            1
        }
    }
}

/// Distributes scenarios over a fixed-size worker pool
pub struct Orchestrator<C: ScenarioContext> {
    loader: ScenarioLoader<C>,
    factory: Arc<dyn WorldFactory<C::World>>,
    workers: usize,
    spider: bool,
}

impl<C: ScenarioContext> Orchestrator<C> {
    /// Create an orchestrator with a single worker
    #[must_use]
    pub fn new(loader: ScenarioLoader<C>, factory: Arc<dyn WorldFactory<C::World>>) -> Self {
        Self {
            loader,
            factory,
            workers: 1,
            spider: false,
        }
    }

    /// With pool size
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Forward the deployment-crawl hint to every worker's world
    #[inline]
    #[must_use]
    pub fn with_spider(mut self, spider: bool) -> Self {
        self.spider = spider;
        self
    }

    /// Run every selected scenario against every base, one base at a time
    ///
    /// Orphans on one base do not stop the following bases.
    ///
    /// # Errors
    /// The first base whose pool cannot be set up.
    pub async fn run(&self, bases: &[ForkSpec]) -> Result<PoolRun, PoolError> {
        let mut run = PoolRun::default();
        for base in bases {
            run.merge(self.run_base(base).await?);
        }
        Ok(run)
    }

    /// Run every selected scenario against one base
    ///
    /// # Errors
    /// - `PoolError::EmptyPool` for a zero-sized pool
    /// - `PoolError::Registry` if the scenario set fails to load
    pub async fn run_base(&self, base: &ForkSpec) -> Result<PoolRun, PoolError> {
        if self.workers == 0 {
            return Err(PoolError::EmptyPool);
        }

        let registry = Registry::load(&self.loader)?;
        let selection = registry.select();
        tracing::info!(
            base = %base.name,
            run = selection.run.len(),
            skipped = selection.skipped.len(),
            workers = self.workers,
            "starting base"
        );

        let mut results: Vec<ScenarioResult> = selection
            .skipped
            .iter()
            .map(|name| {
                let file = registry.get(name).map(|s| s.location().to_string()).unwrap_or_default();
                ScenarioResult::skipped(&base.name, name, file)
            })
            .collect();

        if selection.run.is_empty() {
            return Ok(PoolRun {
                results,
                orphaned: Vec::new(),
            });
        }

        let pool_size = self.workers.min(selection.run.len());
        let mut pending: BTreeSet<String> = selection.run.iter().cloned().collect();
        let mut queue = selection.run.into_iter();

        let (outbox, mut inbox) = mpsc::channel::<WorkerMessage>(pool_size * 2);
        let mut tasks = JoinSet::new();
        let mut handles: HashMap<usize, WorkerHandle> = HashMap::with_capacity(pool_size);

        for index in 0..pool_size {
            let (handle, task) = Worker::spawn(
                index,
                Arc::clone(&self.loader),
                Arc::clone(&self.factory),
                outbox.clone(),
            );
            tasks.spawn(async move {
                match task.await {
                    Ok(exit) => exit,
                    Err(join) => (
                        index,
                        Err(PoolError::CommunicationFailed(format!("worker {index} panicked: {join}"))),
                    ),
                }
            });
            handles.insert(index, handle);
        }
        drop(outbox);

        let mut in_flight: HashMap<usize, String> = HashMap::with_capacity(pool_size);
        for index in 0..pool_size {
            let args = RuntimeArgs {
                spider: self.spider,
                worker_index: index,
            };
            let config = ParentMessage::Config {
                base: base.clone(),
                args,
            };
            if let Some(handle) = handles.get(&index) {
                if handle.send(config).await.is_ok() {
                    if let Some(name) = queue.next() {
                        assign(handle, name, &mut in_flight).await;
                    }
                }
            }
        }

        while !pending.is_empty() {
            tokio::select! {
                Some(message) = inbox.recv() => {
                    let WorkerMessage::Result { worker, result } = message;
                    tracing::info!(
                        base = %result.base,
                        scenario = %result.scenario,
                        worker,
                        passed = !result.is_error(),
                        "scenario finished"
                    );
                    in_flight.remove(&worker);
                    pending.remove(&result.scenario);
                    results.push(result);

                    if let Some(name) = queue.next() {
                        if let Some(handle) = handles.get(&worker) {
                            assign(handle, name, &mut in_flight).await;
                        }
                    }
                }
                Some(joined) = tasks.join_next() => {
                    let (index, status) = match joined {
                        Ok(exit) => exit,
                        Err(join) => {
                            tracing::error!(error = %join, "worker supervisor failed");
                            continue;
                        }
                    };
                    handles.remove(&index);
                    match status {
                        Ok(()) => tracing::warn!(worker = index, "worker exited early"),
                        Err(error) => tracing::error!(worker = index, %error, "worker terminated"),
                    }
                    if let Some(orphan) = in_flight.remove(&index) {
                        tracing::error!(worker = index, scenario = %orphan, "scenario orphaned by dead worker");
                    }
                }
                else => break,
            }

            if !pending.is_empty() && in_flight.is_empty() {
                break;
            }
        }

        for handle in handles.values() {
            let _ = handle.send(ParentMessage::Shutdown).await;
        }
        drop(handles);
        while tasks.join_next().await.is_some() {}

        if pending.is_empty() {
            tracing::info!(base = %base.name, results = results.len(), "base complete");
        } else {
            tracing::error!(
                base = %base.name,
                results = results.len(),
                orphaned = ?pending,
                "pool stalled; orphaned scenarios have no result"
            );
        }

        let orphaned = pending
            .into_iter()
            .map(|scenario| Orphan {
                base: base.name.clone(),
                scenario,
            })
            .collect();
        Ok(PoolRun { results, orphaned })
    }
}

/// Hand `name` to an idle worker and remember the assignment
async fn assign(handle: &WorkerHandle, name: String, in_flight: &mut HashMap<usize, String>) {
    match handle.send(ParentMessage::Scenario { name: name.clone() }).await {
        Ok(()) => {
            in_flight.insert(handle.index(), name);
        }
        Err(error) => {
            tracing::error!(worker = handle.index(), scenario = %name, %error, "assignment failed");
        }
    }
}

impl<C: ScenarioContext> std::fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.workers)
            .field("spider", &self.spider)
            .finish_non_exhaustive()
    }
}
