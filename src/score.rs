//! Mutation score aggregation.

use serde::Serialize;

use crate::mutant::{Mutant, MutantStatus};

/// Per-status counts and the mutation score derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreAggregator {
    /// Killed mutants.
    pub killed: usize,
    /// Survived mutants.
    pub survived: usize,
    /// Timed-out mutants.
    pub timeout: usize,
    /// Uncovered mutants.
    pub no_coverage: usize,
    /// Ignored mutants.
    pub ignored: usize,
    /// Mutants whose unit did not compile.
    pub compile_error: usize,
    /// Mutants whose injection failed.
    pub build_error: usize,
    /// Mutants still not run.
    pub not_run: usize,
}

impl ScoreAggregator {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally the current statuses of `mutants`.
    pub fn from_mutants<'a>(mutants: impl IntoIterator<Item = &'a Mutant>) -> Self {
        let mut tally = Self::new();
        for mutant in mutants {
            tally.record(mutant.status());
        }
        tally
    }

    /// Count one mutant with `status`.
    pub fn record(&mut self, status: MutantStatus) {
        match status {
            MutantStatus::Killed => self.killed += 1,
            MutantStatus::Survived => self.survived += 1,
            MutantStatus::Timeout => self.timeout += 1,
            MutantStatus::NoCoverage => self.no_coverage += 1,
            MutantStatus::Ignored => self.ignored += 1,
            MutantStatus::CompileError => self.compile_error += 1,
            MutantStatus::BuildError => self.build_error += 1,
            MutantStatus::NotRun => self.not_run += 1,
        }
    }

    /// Total mutants counted.
    pub fn total(&self) -> usize {
        self.valid() + self.ignored + self.compile_error + self.build_error
    }

    /// Mutants that count towards the score: everything except ignored and build failures.
    pub fn valid(&self) -> usize {
        self.killed + self.survived + self.timeout + self.no_coverage + self.not_run
    }

    /// Mutants detected by the suite.
    pub fn detected(&self) -> usize {
        self.killed + self.timeout
    }

    /// Detected over valid mutants, NaN when no mutant is valid.
    pub fn score(&self) -> f64 {
        let valid = self.valid();
        if valid == 0 {
            return f64::NAN;
        }
        self.detected() as f64 / valid as f64
    }
}

/// Aggregated run counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Total mutants.
    pub total: usize,
    /// Mutation score as a ratio, `None` when nothing could be scored.
    pub mutation_score: Option<f64>,
    /// Killed mutants.
    pub killed: usize,
    /// Survived mutants.
    pub survived: usize,
    /// Timed-out mutants.
    pub timeout: usize,
    /// Uncovered mutants.
    pub no_coverage: usize,
    /// Ignored mutants.
    pub ignored: usize,
    /// Compile errors.
    pub compile_error: usize,
    /// Build errors.
    pub build_error: usize,
    /// Mutants left not run.
    pub incomplete: usize,
}

impl RunSummary {
    /// Build summary from final mutant states.
    pub fn from_mutants<'a>(mutants: impl IntoIterator<Item = &'a Mutant>) -> Self {
        Self::from(ScoreAggregator::from_mutants(mutants))
    }

    /// Score formatted as a percentage, `n/a` when undefined.
    pub fn score_percent(&self) -> String {
        match self.mutation_score {
            Some(score) => format!("{:.2}%", score * 100.0),
            None => "n/a".to_string(),
        }
    }
}

impl From<ScoreAggregator> for RunSummary {
    fn from(tally: ScoreAggregator) -> Self {
        let score = tally.score();
        Self {
            total: tally.total(),
            mutation_score: (!score.is_nan()).then_some(score),
            killed: tally.killed,
            survived: tally.survived,
            timeout: tally.timeout,
            no_coverage: tally.no_coverage,
            ignored: tally.ignored,
            compile_error: tally.compile_error,
            build_error: tally.build_error,
            incomplete: tally.not_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(statuses: &[MutantStatus]) -> ScoreAggregator {
        let mut tally = ScoreAggregator::new();
        for status in statuses {
            tally.record(*status);
        }
        tally
    }

    #[test]
    fn empty_population_scores_nan() {
        assert!(ScoreAggregator::new().score().is_nan());
        assert!(ScoreAggregator::from_mutants(std::iter::empty::<&Mutant>()).score().is_nan());
        assert_eq!(RunSummary::from(ScoreAggregator::new()).mutation_score, None);
    }

    #[test]
    fn ignored_mutants_leave_the_denominator() {
        let tally = tally(&[
            MutantStatus::Killed,
            MutantStatus::Killed,
            MutantStatus::Survived,
            MutantStatus::Ignored,
        ]);
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.valid(), 3);
        assert!((tally.score() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn timeouts_count_as_detected_and_build_failures_are_excluded() {
        let tally = tally(&[
            MutantStatus::Timeout,
            MutantStatus::Survived,
            MutantStatus::NoCoverage,
            MutantStatus::NotRun,
            MutantStatus::CompileError,
            MutantStatus::BuildError,
        ]);
        assert_eq!(tally.detected(), 1);
        assert_eq!(tally.valid(), 4);
        assert!((tally.score() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn only_excluded_mutants_score_nan() {
        let tally = tally(&[MutantStatus::Ignored, MutantStatus::CompileError]);
        assert!(tally.score().is_nan());
        let summary = RunSummary::from(tally);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.score_percent(), "n/a");
    }

    #[test]
    fn summary_counts_all_statuses() {
        let summary = RunSummary::from(tally(&[
            MutantStatus::Killed,
            MutantStatus::Survived,
            MutantStatus::Timeout,
            MutantStatus::NoCoverage,
            MutantStatus::Ignored,
            MutantStatus::CompileError,
            MutantStatus::BuildError,
            MutantStatus::NotRun,
        ]));
        assert_eq!(summary.total, 8);
        assert_eq!(summary.killed, 1);
        assert_eq!(summary.survived, 1);
        assert_eq!(summary.timeout, 1);
        assert_eq!(summary.no_coverage, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.compile_error, 1);
        assert_eq!(summary.build_error, 1);
        assert_eq!(summary.incomplete, 1);
        assert_eq!(summary.score_percent(), "40.00%");
    }
}
