//! Events emitted while a mutation run progresses.

use serde::{Deserialize, Serialize};

use crate::batch::BatchId;
use crate::mutant::{Mutant, MutantId, MutantStatus};

/// Event emitted during mutation execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    /// Execution of the scheduled mutants begins.
    RunStarted {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Number of mutants in the run.
        mutants: usize,
    },
    /// A batch was handed to the test runner.
    BatchStarted {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Batch number.
        batch_id: BatchId,
        /// Mutants active in the run.
        mutants: Vec<MutantId>,
    },
    /// A mutant reached its final status. Emitted exactly once per mutant.
    MutantTested {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Mutant id.
        mutant_id: MutantId,
        /// Batch that produced the verdict, `None` when resolved before execution.
        #[serde(default)]
        batch_id: Option<BatchId>,
        /// Final status.
        status: MutantStatus,
        /// Diagnostic.
        #[serde(default)]
        reason: Option<String>,
    },
    /// A mutant's batch finished without a verdict for it.
    MutantIncomplete {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Batch number.
        batch_id: BatchId,
        /// Mutant id.
        mutant_id: MutantId,
    },
    /// A batch's test run ended.
    BatchFinished {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Batch number.
        batch_id: BatchId,
        /// Runner error that ended the batch, if any.
        #[serde(default)]
        error: Option<String>,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
    },
    /// Every batch finished.
    RunCompleted {
        /// Unix timestamp millis.
        timestamp_ms: i64,
        /// Mutation score, `None` when nothing could be scored.
        #[serde(default)]
        score: Option<f64>,
    },
}

impl MutationEvent {
    /// Final-status event for `mutant`.
    pub fn tested(mutant: &Mutant, batch_id: Option<BatchId>) -> Self {
        Self::MutantTested {
            timestamp_ms: now_timestamp_ms(),
            mutant_id: mutant.id,
            batch_id,
            status: mutant.status(),
            reason: mutant.status_reason().map(str::to_string),
        }
    }
}

/// Current unix timestamp in milliseconds.
pub fn now_timestamp_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    (duration.as_secs() as i64)
        .saturating_mul(1000)
        .saturating_add(duration.subsec_millis() as i64)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
