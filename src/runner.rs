//! Test runner contract.

use std::time::Duration;

use thiserror::Error;

use crate::coverage::TestSet;
use crate::mutant::MutantId;

/// Runner-level errors. They fail the batch being run, never the whole run.
#[derive(Debug, Error)]
pub enum TestRunnerError {
    /// The test process could not be started.
    #[error("failed to start test run: {0}")]
    Spawn(String),
    /// The test process produced output the runner cannot interpret.
    #[error("unreadable test output: {0}")]
    Output(String),
    /// Any other runner failure.
    #[error("test run failed: {0}")]
    Failed(String),
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One incremental result delivered while a batch's test run progresses.
///
/// Test sets are cumulative for the run: `executed` holds every test finished so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRunUpdate {
    /// Mutants whose verdict may have changed with this update.
    pub tested_mutants: Vec<MutantId>,
    /// Tests that failed.
    pub failing: TestSet,
    /// Tests that ran to completion.
    pub executed: TestSet,
    /// Tests that timed out.
    pub timed_out: TestSet,
}

/// Decision returned by the update handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    /// Keep running tests.
    Continue,
    /// Every mutant of the batch is resolved; the run may stop.
    Stop,
}

/// What a runner needs to execute one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Mutants to activate together.
    pub mutants: Vec<MutantId>,
    /// Tests needed to assess them.
    pub tests: TestSet,
    /// Slack added to the expected suite duration before the run counts as timed out.
    pub timeout: Duration,
}

/// Test runner collaborator.
///
/// `run_batch` blocks until the run finishes or the handler returns [`RunControl::Stop`].
/// Implementations call `on_update` once or more with cumulative results.
pub trait TestRunner: Send + Sync {
    /// Run the suite with the batch's mutants active.
    fn run_batch(
        &self,
        request: &BatchRequest,
        on_update: &mut dyn FnMut(TestRunUpdate) -> RunControl,
    ) -> Result<(), TestRunnerError>;

    /// Release runner resources. Called once after every batch finished.
    fn dispose(&self) {}
}
