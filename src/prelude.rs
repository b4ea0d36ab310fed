//! Prelude module for convenient imports.
//!
//! This module re-exports the items needed to plug a test runner into a mutation run.
//!
//! # Example
//!
//! ```rust,ignore
//! use mutant_sched::prelude::*;
//! ```

pub use crate::batch::{Batch, BatchBuilder};
pub use crate::config::{CoverageAnalysis, MutationConfig};
pub use crate::coverage::{CoverageProvider, CoverageReport, StaticCoverage, TestId, TestSet};
pub use crate::events::MutationEvent;
pub use crate::mutant::{BuildFailureKind, Mutant, MutantId, MutantStatus};
pub use crate::process::{BuildOutcome, MutationTestProcess, ProcessError, ProcessResult};
pub use crate::reporter::Reporter;
pub use crate::runner::{BatchRequest, RunControl, TestRunUpdate, TestRunner, TestRunnerError};
pub use crate::score::{RunSummary, ScoreAggregator};
