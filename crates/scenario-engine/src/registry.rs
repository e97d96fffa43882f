//! Scenario registry
//!
//! One registry exists per process or worker. It is filled once by a
//! [`ScenarioLoader`] and read-only afterwards; registries are never shared
//! across worker boundaries.

use crate::error::RegistryError;
use crate::scenario::{Scenario, ScenarioContext};
use crate::types::RunFlag;
use indexmap::IndexMap;
use std::sync::Arc;

/// Registration pass that populates a registry
///
/// Run once in the orchestrator and once per worker, so every worker holds
/// its own copy of the same scenario set.
pub type ScenarioLoader<C> = Arc<dyn Fn(&mut Registry<C>) -> Result<(), RegistryError> + Send + Sync>;

/// Which scenarios a run executes and which it reports as skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Names to execute, in registration order
    pub run: Vec<String>,
    /// Names to report as skipped, in registration order
    pub skipped: Vec<String>,
}

/// Named scenarios in registration order
pub struct Registry<C: ScenarioContext> {
    scenarios: IndexMap<String, Scenario<C>>,
}

impl<C: ScenarioContext> Registry<C> {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            scenarios: IndexMap::new(),
        }
    }

    /// Create a registry populated by `loader`
    ///
    /// # Errors
    /// Whatever the loader raises, typically `RegistryError::DuplicateName`.
    pub fn load(loader: &ScenarioLoader<C>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        loader(&mut registry)?;
        tracing::debug!(scenarios = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Register a scenario
    ///
    /// # Errors
    /// `RegistryError::DuplicateName` if the name is taken.
    pub fn register(&mut self, scenario: Scenario<C>) -> Result<(), RegistryError> {
        if self.scenarios.contains_key(scenario.name()) {
            return Err(RegistryError::DuplicateName(scenario.name().to_string()));
        }
        self.scenarios.insert(scenario.name().to_string(), scenario);
        Ok(())
    }

    /// Look up a scenario by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Scenario<C>> {
        self.scenarios.get(name)
    }

    /// Look up a scenario by name, failing if absent
    ///
    /// # Errors
    /// `RegistryError::UnknownScenario`.
    pub fn require(&self, name: &str) -> Result<&Scenario<C>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownScenario(name.to_string()))
    }

    /// All scenarios keyed by name
    #[inline]
    #[must_use]
    pub fn all(&self) -> &IndexMap<String, Scenario<C>> {
        &self.scenarios
    }

    /// Registered names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Partition by run flag
    ///
    /// If any scenario is marked `Only`, exactly those run and everything
    /// else is skipped. Otherwise everything not marked `Skip` runs.
    #[must_use]
    pub fn select(&self) -> Selection {
        let any_only = self
            .scenarios
            .values()
            .any(|s| s.run_flag() == RunFlag::Only);

        let mut selection = Selection::default();
        for (name, scenario) in &self.scenarios {
            let runs = match scenario.run_flag() {
                RunFlag::Only => true,
                RunFlag::None => !any_only,
                RunFlag::Skip => false,
            };
            if runs {
                selection.run.push(name.clone());
            } else {
                selection.skipped.push(name.clone());
            }
        }
        selection
    }
}

impl<C: ScenarioContext> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ScenarioContext> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("scenarios", &self.scenarios.keys().collect::<Vec<_>>())
            .finish()
    }
}
