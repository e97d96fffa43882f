//! Error types for the scenario engine
//!
//! One enum per concern:
//! - World (checkpoint, time travel, transport) failures
//! - Scenario failures raised by solutions, checks and test bodies
//! - Registration conflicts
//! - Runner failures that abort a whole scenario
//! - Worker pool and message passing failures
//! - Report and configuration I/O

use crate::types::Diff;
use std::fmt::Debug;

/// Failures raised by a [`World`](crate::world::World) backend
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Checkpoint was already consumed or never issued
    #[error("unknown or already consumed checkpoint: {0}")]
    UnknownCheckpoint(String),

    /// Node answered with a JSON-RPC error
    #[error("rpc `{method}` failed: {message}")]
    Rpc { method: String, message: String },

    /// Node could not be reached or answered garbage
    #[error("transport failure: {0}")]
    Transport(String),

    /// Operation not supported by this backend
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Failure of one combo: raised by a solution, a constraint check or the
/// scenario's test body
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// Assertion-style failure carrying both sides for diffing
    #[error("assertion failed: {message}")]
    Assertion {
        message: String,
        actual: String,
        expected: String,
    },

    /// A constraint's check rejected the context
    #[error("constraint `{constraint}` not satisfied: {reason}")]
    ConstraintViolated { constraint: String, reason: String },

    /// The world refused an operation
    #[error("world error: {0}")]
    World(#[from] WorldError),

    /// Anything else
    #[error("{0}")]
    Failed(String),
}

impl ScenarioError {
    /// Create an assertion error from two debuggable values
    pub fn assertion(
        message: impl Into<String>,
        actual: &impl Debug,
        expected: &impl Debug,
    ) -> Self {
        Self::Assertion {
            message: message.into(),
            actual: format!("{actual:?}"),
            expected: format!("{expected:?}"),
        }
    }

    /// Create a generic failure
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Actual/expected pair for assertion-style errors
    #[must_use]
    pub fn diff(&self) -> Option<Diff> {
        match self {
            Self::Assertion {
                actual, expected, ..
            } => Some(Diff {
                actual: actual.clone(),
                expected: expected.clone(),
            }),
            _ => None,
        }
    }
}

/// Fail with an assertion error unless `actual == expected`
///
/// # Errors
/// `ScenarioError::Assertion` carrying both values.
pub fn expect_eq<T: PartialEq + Debug>(actual: &T, expected: &T) -> Result<(), ScenarioError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ScenarioError::assertion(
            "expected values to be equal",
            actual,
            expected,
        ))
    }
}

/// Render an error together with its `source()` chain
#[must_use]
pub fn trace(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

/// Scenario registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name already registered in this load
    #[error("duplicate scenario name: {0}")]
    DuplicateName(String),

    /// Lookup of a name that was never registered
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}

/// Errors that abort a scenario run before any result is produced
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Base context could not be built
    #[error("failed to initialize context: {0}")]
    Initialize(#[source] ScenarioError),

    /// A constraint threw while proposing solutions
    #[error("constraint `{constraint}` failed to solve: {source}")]
    Solve {
        constraint: String,
        #[source]
        source: ScenarioError,
    },

    /// Snapshot or revert failed; isolation can no longer be guaranteed
    #[error("isolation failed: {0}")]
    Isolation(#[from] WorldError),

    /// Revert failed after a combo had already failed
    #[error("isolation failed after combo failure ({failure}): {source}")]
    IsolationAfterFailure {
        failure: ScenarioError,
        #[source]
        source: WorldError,
    },
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Pool must have at least one slot
    #[error("worker pool size must be at least 1")]
    EmptyPool,

    /// Worker could not connect its world
    #[error("worker {worker} failed to bootstrap: {source}")]
    Bootstrap {
        worker: usize,
        #[source]
        source: WorldError,
    },

    /// Scenario message arrived before the config message
    #[error("worker {0} received work before its config")]
    NotConfigured(usize),

    /// Registry load or lookup failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Runner aborted the scenario
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Channel closed underneath us
    #[error("communication failed: {0}")]
    CommunicationFailed(String),
}

/// Report output errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Writing the report failed
    #[error("report i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed
    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A requested base is not configured
    #[error("unknown base: {0}")]
    UnknownBase(String),

    /// Nothing to run against
    #[error("no bases configured")]
    NoBases,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_error_carries_diff() {
        let err = ScenarioError::assertion("mismatch", &1, &2);
        let diff = err.diff().unwrap();
        assert_eq!(diff.actual, "1");
        assert_eq!(diff.expected, "2");
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn non_assertion_has_no_diff() {
        assert!(ScenarioError::failed("boom").diff().is_none());
    }

    #[test]
    fn expect_eq_passes_and_fails() {
        assert!(expect_eq(&"a", &"a").is_ok());
        let err = expect_eq(&3, &4).unwrap_err();
        assert!(matches!(err, ScenarioError::Assertion { .. }));
    }

    #[test]
    fn trace_includes_sources() {
        let err = RunnerError::Solve {
            constraint: "balance".into(),
            source: ScenarioError::World(WorldError::Transport("refused".into())),
        };
        let rendered = trace(&err);
        assert!(rendered.contains("balance"));
        assert!(rendered.contains("caused by: world error"));
        assert!(rendered.contains("caused by: transport failure: refused"));
    }
}
