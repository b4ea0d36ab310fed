//! Mutation run configuration.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How captured coverage is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageAnalysis {
    /// Ignore coverage: every mutant is assessed by the whole suite.
    Off,
    /// Use per-mutant covering tests.
    #[default]
    PerTest,
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Parallelism of zero.
    #[error("max_parallelism must be at least 1")]
    ZeroParallelism,
    /// Negative timeout slack.
    #[error("additional_timeout_ms must not be negative (got {0})")]
    NegativeTimeout(i64),
    /// Config file could not be parsed.
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a mutation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Group mutants with disjoint covering tests into shared test runs.
    pub batching: bool,
    /// Stop a batch's test run once every mutant in it is resolved.
    pub early_abort: bool,
    /// Coverage is captured per test. When false, static-value mutants must run against the
    /// whole suite.
    pub capture_coverage_per_test: bool,
    /// How captured coverage is used.
    pub coverage_analysis: CoverageAnalysis,
    /// Maximum number of concurrently running batches. `None` uses available parallelism.
    pub max_parallelism: Option<usize>,
    /// Slack added to the test-run timeout of each batch, in milliseconds.
    pub additional_timeout_ms: i64,
    /// Optional substring filter on mutant labels. Non-matching mutants are ignored.
    pub filter: Option<String>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            batching: true,
            early_abort: true,
            capture_coverage_per_test: true,
            coverage_analysis: CoverageAnalysis::PerTest,
            max_parallelism: None,
            additional_timeout_ms: 5_000,
            filter: None,
        }
    }
}

impl MutationConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()
    }

    /// Reject values the core cannot work with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_parallelism == Some(0) {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.additional_timeout_ms < 0 {
            return Err(ConfigError::NegativeTimeout(self.additional_timeout_ms));
        }
        Ok(self)
    }

    /// Enable or disable batching.
    pub fn with_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    /// Enable or disable early abort.
    pub fn with_early_abort(mut self, early_abort: bool) -> Self {
        self.early_abort = early_abort;
        self
    }

    /// Set whether coverage is captured per test.
    pub fn with_capture_coverage_per_test(mut self, capture: bool) -> Self {
        self.capture_coverage_per_test = capture;
        self
    }

    /// Set coverage analysis mode.
    pub fn with_coverage_analysis(mut self, mode: CoverageAnalysis) -> Self {
        self.coverage_analysis = mode;
        self
    }

    /// Set maximum parallelism.
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    /// Set timeout slack in milliseconds.
    pub fn with_additional_timeout_ms(mut self, additional_timeout_ms: i64) -> Self {
        self.additional_timeout_ms = additional_timeout_ms;
        self
    }

    /// Set label filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Effective worker count.
    pub fn parallelism(&self) -> usize {
        self.max_parallelism
            .filter(|p| *p > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Per-batch timeout slack.
    pub fn additional_timeout(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.additional_timeout_ms).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_and_builder_overrides_work() {
        let default = MutationConfig::default();
        assert!(default.batching);
        assert!(default.early_abort);
        assert!(default.capture_coverage_per_test);
        assert_eq!(default.coverage_analysis, CoverageAnalysis::PerTest);
        assert!(default.parallelism() >= 1);

        let cfg = MutationConfig::default()
            .with_batching(false)
            .with_early_abort(false)
            .with_capture_coverage_per_test(false)
            .with_coverage_analysis(CoverageAnalysis::Off)
            .with_max_parallelism(3)
            .with_additional_timeout_ms(250)
            .with_filter("abc");

        assert!(!cfg.batching);
        assert!(!cfg.early_abort);
        assert!(!cfg.capture_coverage_per_test);
        assert_eq!(cfg.coverage_analysis, CoverageAnalysis::Off);
        assert_eq!(cfg.parallelism(), 3);
        assert_eq!(cfg.additional_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.filter.as_deref(), Some("abc"));
    }

    #[test]
    fn validation_rejects_zero_parallelism_and_negative_timeout() {
        let err = MutationConfig::default()
            .with_max_parallelism(0)
            .validate()
            .expect_err("zero parallelism should be rejected");
        assert!(matches!(err, ConfigError::ZeroParallelism));

        let err = MutationConfig::default()
            .with_additional_timeout_ms(-1)
            .validate()
            .expect_err("negative timeout should be rejected");
        assert!(matches!(err, ConfigError::NegativeTimeout(-1)));
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"batching": false, "coverage_analysis": "off"}"#)
            .expect("config should be written");

        let cfg = MutationConfig::load(&path).expect("config should load");
        assert!(!cfg.batching);
        assert!(cfg.early_abort);
        assert_eq!(cfg.coverage_analysis, CoverageAnalysis::Off);
    }

    #[test]
    fn load_validates_values() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"additional_timeout_ms": -20}"#)
            .expect("config should be written");

        let err = MutationConfig::load(&path).expect_err("negative timeout should fail");
        assert!(matches!(err, ConfigError::NegativeTimeout(-20)));
    }
}
