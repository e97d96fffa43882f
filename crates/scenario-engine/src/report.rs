//! Result reporting
//!
//! Pure formatting over the aggregated result list: a console summary with
//! per-failure traces and diffs, or a mocha-style JSON document.

use crate::config::{ReportConfig, ReportFormat};
use crate::error::ReportError;
use crate::types::ScenarioResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

/// Aggregate counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub passes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub total: usize,
}

impl Summary {
    /// Count results by outcome
    #[must_use]
    pub fn of(results: &[ScenarioResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            if result.skipped {
                summary.skipped += 1;
            } else if result.is_error() {
                summary.failures += 1;
            } else {
                summary.passes += 1;
            }
        }
        summary
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped ({} total)",
            self.passes, self.failures, self.skipped, self.total
        )
    }
}

/// Process exit status for a result list: 1 if any result carries an error
#[must_use]
pub fn exit_code(results: &[ScenarioResult]) -> i32 {
    i32::from(results.iter().any(ScenarioResult::is_error))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonStats {
    suites: usize,
    tests: usize,
    passes: usize,
    pending: usize,
    failures: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonError {
    message: String,
    stack: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonTest {
    title: String,
    full_title: String,
    file: String,
    duration: u64,
    current_retry: u32,
    gas_used: u64,
    num_solution_sets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<JsonError>,
}

impl From<&ScenarioResult> for JsonTest {
    fn from(result: &ScenarioResult) -> Self {
        let err = result.error.as_ref().map(|message| JsonError {
            message: message.clone(),
            stack: result.trace.clone().unwrap_or_default(),
            actual: result.diff.as_ref().map(|d| d.actual.clone()),
            expected: result.diff.as_ref().map(|d| d.expected.clone()),
        });
        Self {
            title: result.scenario.clone(),
            full_title: format!("{} {}", result.base, result.scenario),
            file: result.file.clone(),
            duration: result.elapsed,
            current_retry: 0,
            gas_used: result.gas_used,
            num_solution_sets: result.num_solution_sets,
            err,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonReport {
    stats: JsonStats,
    tests: Vec<JsonTest>,
    pending: Vec<JsonTest>,
    failures: Vec<JsonTest>,
    passes: Vec<JsonTest>,
}

/// Formats and writes aggregated results
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    format: ReportFormat,
    output: Option<PathBuf>,
}

impl Reporter {
    /// Create a reporter from configuration
    #[must_use]
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            format: config.format,
            output: config.output.clone(),
        }
    }

    /// Render the console format
    #[must_use]
    pub fn render_console(results: &[ScenarioResult]) -> String {
        let mut out = String::new();

        for result in results {
            let _ = if result.skipped {
                writeln!(out, "  - [{}] {} (skipped)", result.base, result.scenario)
            } else {
                let marker = if result.is_error() { "✗" } else { "✓" };
                writeln!(
                    out,
                    "  {marker} [{}] {} ({} combos, avg gas {}, {}ms)",
                    result.base,
                    result.scenario,
                    result.num_solution_sets,
                    result.gas_used,
                    result.elapsed
                )
            };
        }

        let failures: Vec<&ScenarioResult> = results.iter().filter(|r| r.is_error()).collect();
        if !failures.is_empty() {
            out.push_str("\nFailures:\n");
            for (i, result) in failures.iter().enumerate() {
                let _ = writeln!(out, "\n  {}) [{}] {} ({})", i + 1, result.base, result.scenario, result.file);
                let detail = result
                    .trace
                    .as_deref()
                    .or(result.error.as_deref())
                    .unwrap_or_default();
                for line in detail.lines() {
                    let _ = writeln!(out, "     {line}");
                }
                if let Some(diff) = &result.diff {
                    let _ = writeln!(out, "     + expected: {}", diff.expected);
                    let _ = writeln!(out, "     - actual:   {}", diff.actual);
                }
            }
        }

        let _ = writeln!(out, "\n{}", Summary::of(results));
        out
    }

    /// Render the JSON format
    ///
    /// # Errors
    /// `ReportError::Json` if encoding fails.
    pub fn render_json(
        results: &[ScenarioResult],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ReportError> {
        let summary = Summary::of(results);
        let suites: BTreeSet<&str> = results.iter().map(|r| r.base.as_str()).collect();

        let report = JsonReport {
            stats: JsonStats {
                suites: suites.len(),
                tests: summary.total,
                passes: summary.passes,
                pending: summary.skipped,
                failures: summary.failures,
                start,
                end,
                duration: (end - start).num_milliseconds(),
            },
            tests: results.iter().map(JsonTest::from).collect(),
            pending: results.iter().filter(|r| r.skipped).map(JsonTest::from).collect(),
            failures: results.iter().filter(|r| r.is_error()).map(JsonTest::from).collect(),
            passes: results.iter().filter(|r| r.is_pass()).map(JsonTest::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Render in the configured format
    ///
    /// # Errors
    /// `ReportError::Json` if encoding fails.
    pub fn render(
        &self,
        results: &[ScenarioResult],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ReportError> {
        match self.format {
            ReportFormat::Console => Ok(Self::render_console(results)),
            ReportFormat::Json => Self::render_json(results, start, end),
        }
    }

    /// Write the report to the configured file, or stdout
    ///
    /// # Errors
    /// `ReportError::Io` on write failure, `ReportError::Json` on encoding
    /// failure.
    pub fn report(
        &self,
        results: &[ScenarioResult],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ReportError> {
        let rendered = self.render(results, start, end)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, rendered)?;
                tracing::info!(path = %path.display(), "report written");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}
