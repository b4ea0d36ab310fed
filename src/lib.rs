//! # mutant-sched
//!
//! `mutant-sched` schedules and tracks the test runs of a mutation-testing session:
//! - `coverage`: test sets and the coverage-capture contract
//! - `mutant`: the mutant lifecycle state machine
//! - `batch`: greedy grouping of mutants with disjoint covering tests
//! - `executor`: bounded parallel execution of batches with early abort
//! - `score`: mutation score aggregation
//! - `process`: a full run, from generated mutants to final statuses
//!
//! Mutation generation, compilation and the test framework stay outside the crate; they plug in
//! through [`CoverageProvider`], [`BuildOutcome`] and [`TestRunner`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod batch;
pub mod command;
pub mod config;
pub mod coverage;
pub mod events;
pub mod executor;
pub mod mutant;
pub mod plan;
pub mod prelude;
pub mod process;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod score;

pub use batch::{Batch, BatchBuilder, BatchId, Batches};
pub use command::{ACTIVE_MUTANTS_ENV, CommandTestRunner, SELECTED_TESTS_ENV};
pub use config::{ConfigError, CoverageAnalysis, MutationConfig};
pub use coverage::{
    CoverageError, CoverageProvider, CoverageReport, StaticCoverage, TestId, TestSet,
};
pub use events::{MutationEvent, duration_ms, now_timestamp_ms};
pub use executor::{BatchReport, ExecutionCoordinator, ExecutionError, ExecutionResult};
pub use mutant::{BuildFailureKind, Mutant, MutantId, MutantStatus, TransitionError};
pub use plan::{PlanError, RunPlan};
pub use process::{
    BuildFailure, BuildOutcome, MutationTestProcess, ProcessError, ProcessResult, prepare_mutants,
};
pub use report::{
    BatchSummary, MutantReport, PlannedBatch, ReportFormat, render_plan, render_report,
};
pub use reporter::{
    CollectingReporter, EventLog, EventLogError, JsonlReporter, NullReporter, Reporter,
    TracingReporter, read_events,
};
pub use runner::{BatchRequest, RunControl, TestRunUpdate, TestRunner, TestRunnerError};
pub use score::{RunSummary, ScoreAggregator};
