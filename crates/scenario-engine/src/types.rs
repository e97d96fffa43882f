//! Core value types shared across the engine
//!
//! Everything here crosses the worker boundary, so all of it is plain,
//! serializable data.

use serde::{Deserialize, Serialize};

/// Opaque requirement specification, interpreted only by constraints
pub type Requirements = serde_json::Value;

/// Which scenarios a run selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunFlag {
    /// Run unless some other scenario is marked `Only`
    #[default]
    None,
    /// Run this scenario (and other `Only` ones) exclusively
    Only,
    /// Never run; report as skipped
    Skip,
}

/// Execution receipt returned by a test body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// Cost metric of the executed transaction(s)
    pub gas_used: u64,
}

impl ExecutionReceipt {
    /// Create a receipt with the given cost
    #[inline]
    #[must_use]
    pub fn new(gas_used: u64) -> Self {
        Self { gas_used }
    }
}

/// Actual/expected pair extracted from an assertion failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub actual: String,
    pub expected: String,
}

/// Outcome of one (base, scenario) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    /// Base the scenario ran against
    pub base: String,
    /// Source location the scenario was registered from
    pub file: String,
    /// Scenario name
    pub scenario: String,
    /// Average gas per attempted combo
    pub gas_used: u64,
    /// Combos attempted, successful or not
    pub num_solution_sets: u64,
    /// Wall time in milliseconds
    pub elapsed: u64,
    /// Error message of the failing combo
    pub error: Option<String>,
    /// Error with its cause chain
    pub trace: Option<String>,
    /// Assertion diff, if the failure carried one
    pub diff: Option<Diff>,
    /// Scenario was filtered out by run flags
    #[serde(default)]
    pub skipped: bool,
}

impl ScenarioResult {
    /// Result for a scenario that was filtered out and never executed
    #[must_use]
    pub fn skipped(base: impl Into<String>, scenario: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            file: file.into(),
            scenario: scenario.into(),
            gas_used: 0,
            num_solution_sets: 0,
            elapsed: 0,
            error: None,
            trace: None,
            diff: None,
            skipped: true,
        }
    }

    /// Whether this result carries an error
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Executed without error
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}
