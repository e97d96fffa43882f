//! Engine configuration
//!
//! Loaded from TOML by the CLI; every field has a default so an empty file
//! is a valid configuration (one simulated base).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder in a base URL replaced by the worker index
pub const WORKER_PLACEHOLDER: &str = "{worker}";

/// One target-environment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSpec {
    /// Base name, as used in results and on the command line
    pub name: String,
    /// Node URL; `None` selects the simulated world
    #[serde(default)]
    pub url: Option<String>,
    /// Block to fork from
    #[serde(default)]
    pub block_number: Option<u64>,
}

impl ForkSpec {
    /// Create a base without a node URL
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            block_number: None,
        }
    }

    /// With node URL
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// With fork block
    #[inline]
    #[must_use]
    pub fn with_block_number(mut self, block: u64) -> Self {
        self.block_number = Some(block);
        self
    }

    /// Node URL for one worker, substituting the worker placeholder
    #[must_use]
    pub fn url_for(&self, worker_index: usize) -> Option<String> {
        self.url
            .as_ref()
            .map(|url| url.replace(WORKER_PLACEHOLDER, &worker_index.to_string()))
    }
}

/// Per-worker runtime arguments sent with the config message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeArgs {
    /// Forwarded to worlds as a hint that an external deployment crawler
    /// runs before scenarios; the engine itself crawls nothing
    pub spider: bool,
    /// Index of the receiving worker in its pool
    pub worker_index: usize,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable summary
    #[default]
    Console,
    /// Mocha-style JSON document
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,
    /// Write to this file instead of stdout
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Configured bases
    #[serde(default = "default_bases")]
    pub bases: Vec<ForkSpec>,
    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(4)
}

fn default_bases() -> Vec<ForkSpec> {
    vec![ForkSpec::new("development")]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            bases: default_bases(),
            report: ReportConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if unreadable, `ConfigError::Parse` if malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// With worker pool size
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// With bases
    #[inline]
    #[must_use]
    pub fn with_bases(mut self, bases: Vec<ForkSpec>) -> Self {
        self.bases = bases;
        self
    }

    /// With report settings
    #[inline]
    #[must_use]
    pub fn with_report(mut self, report: ReportConfig) -> Self {
        self.report = report;
        self
    }

    /// Resolve a list of base names; an empty list selects every base
    ///
    /// # Errors
    /// `ConfigError::UnknownBase` for unconfigured names,
    /// `ConfigError::NoBases` if the selection is empty.
    pub fn select_bases(&self, names: &[String]) -> Result<Vec<ForkSpec>, ConfigError> {
        let selected = if names.is_empty() {
            self.bases.clone()
        } else {
            names
                .iter()
                .map(|name| {
                    self.bases
                        .iter()
                        .find(|b| &b.name == name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownBase(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if selected.is_empty() {
            return Err(ConfigError::NoBases);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert!(config.workers >= 1);
        assert_eq!(config.bases, vec![ForkSpec::new("development")]);
        assert_eq!(config.report.format, ReportFormat::Console);
    }

    #[test]
    fn parses_bases_and_report() {
        let config = EngineConfig::from_toml(
            r#"
            workers = 2

            [[bases]]
            name = "mainnet"
            url = "http://127.0.0.1:854{worker}"
            block_number = 15000000

            [[bases]]
            name = "local"

            [report]
            format = "json"
            output = "report.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.bases.len(), 2);
        assert_eq!(config.bases[0].block_number, Some(15_000_000));
        assert_eq!(
            config.bases[0].url_for(3).as_deref(),
            Some("http://127.0.0.1:8543")
        );
        assert_eq!(config.bases[1].url_for(0), None);
        assert_eq!(config.report.format, ReportFormat::Json);
    }

    #[test]
    fn select_bases_filters_and_rejects_unknown() {
        let config = EngineConfig::new()
            .with_bases(vec![ForkSpec::new("a"), ForkSpec::new("b")]);

        assert_eq!(config.select_bases(&[]).unwrap().len(), 2);
        let only_b = config.select_bases(&["b".to_string()]).unwrap();
        assert_eq!(only_b, vec![ForkSpec::new("b")]);
        assert!(matches!(
            config.select_bases(&["c".to_string()]),
            Err(ConfigError::UnknownBase(name)) if name == "c"
        ));
    }

    #[test]
    fn select_bases_requires_one() {
        let config = EngineConfig::new().with_bases(Vec::new());
        assert!(matches!(config.select_bases(&[]), Err(ConfigError::NoBases)));
    }

    #[test]
    fn report_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
