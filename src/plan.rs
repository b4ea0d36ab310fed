//! JSON run plans.
//!
//! A plan bundles what the generation, build and coverage steps produced so a run can be
//! scheduled without them:
//!
//! ```json
//! {
//!   "control_run_succeeded": true,
//!   "mutants": [
//!     { "id": 1, "label": "src/lib.rs:10 replace + with -", "covering_tests": { "tests": ["t1"] } }
//!   ],
//!   "build_failures": { "2": { "kind": "compile", "message": "E0308" } }
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::{CoverageReport, StaticCoverage};
use crate::mutant::{Mutant, MutantId, MutantStatus};
use crate::process::BuildOutcome;

/// Plan loading errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan is not valid JSON for this format.
    #[error("invalid plan: {0}")]
    Parse(#[from] serde_json::Error),
    /// Two mutants share an id.
    #[error("duplicate mutant id {0}")]
    DuplicateMutant(MutantId),
    /// A mutant arrives with a verdict only scheduling may assign.
    #[error("mutant {id} cannot start as {status}")]
    ResolvedMutant {
        /// Mutant id.
        id: MutantId,
        /// Status found in the plan.
        status: MutantStatus,
    },
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mutants plus the verdicts of the steps before scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Whether the suite passed without mutations.
    #[serde(default = "default_control_run")]
    pub control_run_succeeded: bool,
    /// Diagnostic for a failed control run.
    #[serde(default)]
    pub control_run_message: Option<String>,
    /// Generated mutants with their covering tests.
    pub mutants: Vec<Mutant>,
    /// Mutants excluded by the build step.
    #[serde(default)]
    pub build_failures: BuildOutcome,
}

fn default_control_run() -> bool {
    true
}

impl RunPlan {
    /// Parse a plan from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        let plan: Self = serde_json::from_str(raw)?;
        plan.validate()
    }

    /// Read a plan file.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn validate(self) -> Result<Self, PlanError> {
        let mut seen = BTreeSet::new();
        for mutant in &self.mutants {
            if !seen.insert(mutant.id) {
                return Err(PlanError::DuplicateMutant(mutant.id));
            }
            if !matches!(mutant.status(), MutantStatus::NotRun | MutantStatus::Ignored) {
                return Err(PlanError::ResolvedMutant {
                    id: mutant.id,
                    status: mutant.status(),
                });
            }
        }
        Ok(self)
    }

    /// Coverage recorded in the plan, as a provider.
    pub fn coverage(&self) -> StaticCoverage {
        let report = if self.control_run_succeeded {
            CoverageReport::passed(
                self.mutants
                    .iter()
                    .map(|m| (m.id, m.covering_tests.clone()))
                    .collect(),
            )
        } else {
            CoverageReport::failed(
                self.control_run_message
                    .clone()
                    .unwrap_or_else(|| "control run failed".to_string()),
            )
        };
        StaticCoverage::new(report)
    }
}
