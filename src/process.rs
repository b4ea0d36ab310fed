//! Mutation run orchestration.
//!
//! A run takes generated mutants through filtering, build failures and coverage before the
//! remaining ones are batched and executed. Mutants resolved before execution are reported once
//! each without a batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::BatchBuilder;
use crate::config::{CoverageAnalysis, MutationConfig};
use crate::coverage::{CoverageError, CoverageProvider, TestSet};
use crate::events::{MutationEvent, now_timestamp_ms};
use crate::executor::{BatchReport, ExecutionCoordinator, ExecutionError};
use crate::mutant::{BuildFailureKind, Mutant, MutantId, MutantStatus, TransitionError};
use crate::reporter::Reporter;
use crate::runner::TestRunner;
use crate::score::RunSummary;

/// Fatal run errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The suite failed without any mutation active.
    #[error("control test run failed: {0}")]
    ControlRunFailed(String),
    /// Coverage could not be captured.
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    /// A mutant was driven into an illegal transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Batch execution failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// One mutant excluded by the build/injection step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailure {
    /// Failure kind.
    pub kind: BuildFailureKind,
    /// Compiler or injector diagnostic.
    #[serde(default)]
    pub message: String,
}

/// Result of building the mutated code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildOutcome {
    /// Excluded mutants.
    pub failures: BTreeMap<MutantId, BuildFailure>,
}

impl BuildOutcome {
    /// Clean build.
    pub fn clean() -> Self {
        Self::default()
    }

    /// Record a failure for `id`.
    pub fn with_failure(
        mut self,
        id: MutantId,
        kind: BuildFailureKind,
        message: impl Into<String>,
    ) -> Self {
        self.failures.insert(
            id,
            BuildFailure {
                kind,
                message: message.into(),
            },
        );
        self
    }
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Every mutant with its final status, ordered by id.
    pub mutants: Vec<Mutant>,
    /// Aggregated counts and score.
    pub summary: RunSummary,
    /// Per-batch outcomes.
    pub batches: Vec<BatchReport>,
}

impl ProcessResult {
    /// Mutation score, NaN when nothing could be scored.
    pub fn score(&self) -> f64 {
        self.summary.mutation_score.unwrap_or(f64::NAN)
    }
}

/// Apply the filter, build failures and coverage to freshly generated mutants.
///
/// Returns the mutants with coverage assigned; those still `NotRun` are ready for batching.
pub fn prepare_mutants(
    config: &MutationConfig,
    mut mutants: Vec<Mutant>,
    build: &BuildOutcome,
    coverage: &dyn CoverageProvider,
) -> Result<Vec<Mutant>, ProcessError> {
    if let Some(filter) = &config.filter {
        for mutant in mutants
            .iter_mut()
            .filter(|m| m.status() == MutantStatus::NotRun && !m.label.contains(filter.as_str()))
        {
            mutant.ignore("Removed by filter")?;
        }
    }

    for mutant in &mut mutants {
        if let Some(failure) = build.failures.get(&mutant.id) {
            debug!(mutant_id = mutant.id.0, kind = ?failure.kind, "build failure");
            mutant.mark_build_failure(failure.kind, failure.message.clone())?;
        }
    }

    let report = coverage.capture(&mutants)?;
    if !report.control_run_succeeded {
        let message = report
            .control_run_message
            .unwrap_or_else(|| "the suite failed without mutations".to_string());
        return Err(ProcessError::ControlRunFailed(message));
    }

    let mut uncovered = 0usize;
    for mutant in mutants
        .iter_mut()
        .filter(|m| m.status() == MutantStatus::NotRun)
    {
        mutant.covering_tests = match config.coverage_analysis {
            CoverageAnalysis::Off => TestSet::every(),
            CoverageAnalysis::PerTest => report.tests_for(mutant.id),
        };
        mutant.promote_static(config.capture_coverage_per_test);
        if mutant.resolve_coverage() {
            uncovered += 1;
        }
    }
    if uncovered > 0 {
        info!(mutants = uncovered, "mutants without coverage");
    }
    Ok(mutants)
}

/// Drives one mutation run.
pub struct MutationTestProcess {
    config: MutationConfig,
    runner: Arc<dyn TestRunner>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for MutationTestProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationTestProcess")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MutationTestProcess {
    /// Process using `runner` for test runs and `reporter` for events.
    pub fn new(
        config: MutationConfig,
        runner: Arc<dyn TestRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            runner,
            reporter,
        }
    }

    /// Run configuration.
    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Resolve, batch and execute `mutants`.
    pub async fn run(
        &self,
        mutants: Vec<Mutant>,
        build: &BuildOutcome,
        coverage: &dyn CoverageProvider,
    ) -> Result<ProcessResult, ProcessError> {
        let mutants = prepare_mutants(&self.config, mutants, build, coverage)?;
        self.reporter.report(&MutationEvent::RunStarted {
            timestamp_ms: now_timestamp_ms(),
            mutants: mutants.len(),
        });

        let (pending, mut resolved): (Vec<Mutant>, Vec<Mutant>) = mutants
            .into_iter()
            .partition(|m| m.status() == MutantStatus::NotRun);
        for mutant in &resolved {
            self.reporter.report(&MutationEvent::tested(mutant, None));
        }

        let batches = BatchBuilder::from_config(&self.config).build(pending);
        info!(
            pending = batches.remaining(),
            resolved = resolved.len(),
            total_tests = batches.total_tests(),
            "scheduling mutants"
        );

        let execution = ExecutionCoordinator::new(Arc::clone(&self.runner), &self.config)
            .execute(batches, Arc::clone(&self.reporter))
            .await?;
        let failed_batches = execution.batches.iter().filter(|b| b.error.is_some()).count();
        if failed_batches > 0 {
            warn!(batches = failed_batches, "some batches failed");
        }

        resolved.extend(execution.mutants);
        resolved.sort_by_key(|m| m.id);
        let summary = RunSummary::from_mutants(&resolved);

        self.reporter.report(&MutationEvent::RunCompleted {
            timestamp_ms: now_timestamp_ms(),
            score: summary.mutation_score,
        });
        info!(
            score = %summary.score_percent(),
            killed = summary.killed,
            survived = summary.survived,
            "mutation run completed"
        );

        Ok(ProcessResult {
            mutants: resolved,
            summary,
            batches: execution.batches,
        })
    }
}
