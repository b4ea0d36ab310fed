//! Mutant lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::TestSet;

/// Stable mutant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutantId(pub u32);

impl fmt::Display for MutantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a mutant. Everything except [`MutantStatus::NotRun`] is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantStatus {
    /// Not yet resolved.
    #[default]
    NotRun,
    /// No test covers the mutant.
    NoCoverage,
    /// Excluded before execution.
    Ignored,
    /// A covering test failed.
    Killed,
    /// Every covering test passed.
    Survived,
    /// A covering test timed out.
    Timeout,
    /// The unit containing the mutant did not compile.
    CompileError,
    /// Injection of the mutated assembly failed.
    BuildError,
}

impl MutantStatus {
    /// True if status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotRun)
    }

    /// True for statuses produced by analyzing a test run.
    pub fn is_tested(&self) -> bool {
        matches!(self, Self::Killed | Self::Survived | Self::Timeout)
    }

    /// True if the mutant was detected by the suite.
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Killed | Self::Timeout)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRun => "not_run",
            Self::NoCoverage => "no_coverage",
            Self::Ignored => "ignored",
            Self::Killed => "killed",
            Self::Survived => "survived",
            Self::Timeout => "timeout",
            Self::CompileError => "compile_error",
            Self::BuildError => "build_error",
        }
    }
}

impl fmt::Display for MutantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of build failure reported by the build/injection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFailureKind {
    /// Compilation of the containing unit failed.
    Compile,
    /// Injection failed for reasons unrelated to the mutation.
    Build,
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mutant {id}: cannot move from {from} to {to}")]
pub struct TransitionError {
    /// Mutant id.
    pub id: MutantId,
    /// Current status.
    pub from: MutantStatus,
    /// Requested status.
    pub to: MutantStatus,
}

/// One candidate code alteration tracked through its test verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutant {
    /// Identity.
    pub id: MutantId,
    /// Human-readable description.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    status: MutantStatus,
    #[serde(default)]
    status_reason: Option<String>,
    /// Tests known to exercise the mutant.
    #[serde(default)]
    pub covering_tests: TestSet,
    /// The mutant's effect cannot be scoped to its covering tests.
    #[serde(default)]
    pub must_run_against_all_tests: bool,
    /// Mutation of a value only observable at initialization.
    #[serde(default)]
    pub is_static_value: bool,
}

impl Mutant {
    /// New mutant in [`MutantStatus::NotRun`] without coverage.
    pub fn new(id: MutantId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            status: MutantStatus::NotRun,
            status_reason: None,
            covering_tests: TestSet::empty(),
            must_run_against_all_tests: false,
            is_static_value: false,
        }
    }

    /// Set covering tests.
    pub fn with_covering_tests(mut self, tests: TestSet) -> Self {
        self.covering_tests = tests;
        self
    }

    /// Mark as a static-value mutant.
    pub fn with_static_value(mut self, is_static_value: bool) -> Self {
        self.is_static_value = is_static_value;
        self
    }

    /// Require a run against the whole suite.
    pub fn with_must_run_against_all_tests(mut self, must_run: bool) -> Self {
        self.must_run_against_all_tests = must_run;
        self
    }

    /// Current status.
    pub fn status(&self) -> MutantStatus {
        self.status
    }

    /// Diagnostic for the current status.
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Tests that decide the verdict: the whole suite for exempt mutants.
    pub fn assessing_tests(&self) -> TestSet {
        if self.must_run_against_all_tests {
            TestSet::every()
        } else {
            self.covering_tests.clone()
        }
    }

    fn transition(
        &mut self,
        to: MutantStatus,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.status_reason = Some(reason.into());
        Ok(())
    }

    /// Exclude the mutant before execution.
    pub fn ignore(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(MutantStatus::Ignored, reason)
    }

    /// Record a build failure. An ignored mutant stays ignored.
    pub fn mark_build_failure(
        &mut self,
        kind: BuildFailureKind,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status == MutantStatus::Ignored {
            return Ok(());
        }
        let to = match kind {
            BuildFailureKind::Compile => MutantStatus::CompileError,
            BuildFailureKind::Build => MutantStatus::BuildError,
        };
        self.transition(to, reason)
    }

    /// Promote a static-value mutant to run against all tests when per-test coverage is not
    /// captured.
    pub fn promote_static(&mut self, capture_coverage_per_test: bool) {
        if !capture_coverage_per_test && self.is_static_value {
            self.must_run_against_all_tests = true;
        }
    }

    /// Resolve an uncovered mutant to [`MutantStatus::NoCoverage`].
    ///
    /// Returns true if the mutant was resolved.
    pub fn resolve_coverage(&mut self) -> bool {
        if self.status != MutantStatus::NotRun
            || self.must_run_against_all_tests
            || !self.covering_tests.is_empty()
        {
            return false;
        }
        self.status = MutantStatus::NoCoverage;
        self.status_reason = Some("Not covered by any test.".to_string());
        true
    }

    /// Fold one test-run result into the status.
    ///
    /// Terminal mutants are left untouched. A `NotRun` mutant becomes `Killed` if an assessing
    /// test failed, `Timeout` if one timed out, `Survived` once every assessing test ran, and
    /// otherwise stays `NotRun`.
    pub fn analyze_test_run(
        &mut self,
        failed: &TestSet,
        ran: &TestSet,
        timed_out: &TestSet,
    ) -> MutantStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let assessing = self.assessing_tests();
        if assessing.intersects(failed) {
            self.status = MutantStatus::Killed;
            self.status_reason = Some(match assessing.first_common(failed) {
                Some(test) => format!("Killed by {test}"),
                None => "Killed by the test run".to_string(),
            });
        } else if assessing.intersects(timed_out) {
            self.status = MutantStatus::Timeout;
            self.status_reason = Some(match assessing.first_common(timed_out) {
                Some(test) => format!("Timed out in {test}"),
                None => "The test run timed out".to_string(),
            });
        } else if assessing.is_covered_by(ran) {
            self.status = MutantStatus::Survived;
            self.status_reason = Some("All covering tests passed".to_string());
        }
        self.status
    }

    /// Attach a diagnostic to a mutant left unresolved after its batch.
    pub fn note_incomplete(&mut self, reason: impl Into<String>) {
        if self.status == MutantStatus::NotRun {
            self.status_reason = Some(reason.into());
        }
    }
}
