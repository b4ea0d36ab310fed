//! Concurrent execution of batches.
//!
//! Each batch runs on a blocking worker that owns the batch, and with it the only mutable
//! handle to its mutants. Workers fold runner updates into mutant statuses and push events on a
//! channel; a single consumer task forwards them to the reporter and keeps a live tally.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchId};
use crate::config::MutationConfig;
use crate::events::{MutationEvent, duration_ms, now_timestamp_ms};
use crate::mutant::{Mutant, MutantId, MutantStatus};
use crate::reporter::Reporter;
use crate::runner::{BatchRequest, RunControl, TestRunUpdate, TestRunner};
use crate::score::ScoreAggregator;

/// Execution failures that are not local to one batch.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A worker or the event consumer panicked outside the runner call.
    #[error("execution task failed: {0}")]
    Join(#[from] JoinError),
    /// The worker pool was shut down while batches were pending.
    #[error("worker pool closed: {0}")]
    PoolClosed(#[from] AcquireError),
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Batch number.
    pub batch_id: BatchId,
    /// Mutants of the batch.
    pub mutants: Vec<MutantId>,
    /// Runner error, if the run failed.
    pub error: Option<String>,
    /// Mutants left not run after the batch.
    pub incomplete: Vec<MutantId>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// Result of executing all batches.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Every executed mutant, ordered by id.
    pub mutants: Vec<Mutant>,
    /// Per-batch outcomes, ordered by batch id.
    pub batches: Vec<BatchReport>,
    /// Tally of the final statuses reported while running.
    pub reported: ScoreAggregator,
}

struct BatchOutcome {
    batch: Batch,
    report: BatchReport,
}

/// Runs batches against a [`TestRunner`] with bounded parallelism.
pub struct ExecutionCoordinator {
    runner: Arc<dyn TestRunner>,
    parallelism: usize,
    early_abort: bool,
    timeout: Duration,
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("parallelism", &self.parallelism)
            .field("early_abort", &self.early_abort)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    /// Coordinator using `config` for parallelism, early abort and timeout slack.
    pub fn new(runner: Arc<dyn TestRunner>, config: &MutationConfig) -> Self {
        Self {
            runner,
            parallelism: config.parallelism(),
            early_abort: config.early_abort,
            timeout: config.additional_timeout(),
        }
    }

    /// Maximum number of concurrently running batches.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run every batch, then dispose of the runner.
    ///
    /// Batches are pulled from `batches` only when a worker slot is free. A runner error or
    /// panic fails its batch only; the mutants of that batch keep whatever status they reached.
    pub async fn execute<I>(
        &self,
        batches: I,
        reporter: Arc<dyn Reporter>,
    ) -> Result<ExecutionResult, ExecutionError>
    where
        I: IntoIterator<Item = Batch>,
    {
        let (events, rx) = mpsc::unbounded_channel();
        let consumer = tokio::task::spawn_blocking(move || consume_events(rx, reporter));

        let slots = Arc::new(Semaphore::new(self.parallelism));
        let mut workers = JoinSet::new();
        let mut dispatched = 0usize;

        let mut batches = batches.into_iter();
        loop {
            let permit = Arc::clone(&slots).acquire_owned().await?;
            let Some(batch) = batches.next() else {
                break;
            };
            let runner = Arc::clone(&self.runner);
            let events = events.clone();
            let early_abort = self.early_abort;
            let timeout = self.timeout;
            dispatched += 1;
            workers.spawn_blocking(move || {
                let _permit = permit;
                run_batch(runner.as_ref(), batch, early_abort, timeout, &events)
            });
        }
        drop(events);
        info!(batches = dispatched, parallelism = self.parallelism, "all batches dispatched");

        let mut mutants = Vec::new();
        let mut reports = Vec::with_capacity(dispatched);
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    reports.push(outcome.report);
                    mutants.extend(outcome.batch.into_mutants());
                }
                Err(err) => {
                    error!(error = %err, "batch worker failed");
                    failure.get_or_insert(err);
                }
            }
        }

        self.runner.dispose();
        let reported = consumer.await?;
        if let Some(err) = failure {
            return Err(err.into());
        }

        mutants.sort_by_key(|m| m.id);
        reports.sort_by_key(|r| r.batch_id);
        Ok(ExecutionResult {
            mutants,
            batches: reports,
            reported,
        })
    }
}

fn send(events: &UnboundedSender<MutationEvent>, event: MutationEvent) {
    // The consumer outlives every worker; a closed channel only happens during teardown.
    let _ = events.send(event);
}

fn run_batch(
    runner: &dyn TestRunner,
    mut batch: Batch,
    early_abort: bool,
    timeout: Duration,
    events: &UnboundedSender<MutationEvent>,
) -> BatchOutcome {
    let batch_id = batch.id();
    let mutant_ids = batch.mutant_ids();
    let request = BatchRequest {
        mutants: mutant_ids.clone(),
        tests: batch.tests(),
        timeout,
    };
    debug!(batch_id = batch_id.0, mutants = mutant_ids.len(), "starting batch");
    send(
        events,
        MutationEvent::BatchStarted {
            timestamp_ms: now_timestamp_ms(),
            batch_id,
            mutants: mutant_ids.clone(),
        },
    );

    let started = Instant::now();
    let mut reported: BTreeSet<MutantId> = BTreeSet::new();
    let result = {
        let mut on_update = |update: TestRunUpdate| -> RunControl {
            for id in &update.tested_mutants {
                let Some(mutant) = batch.get_mut(*id) else {
                    warn!(
                        batch_id = batch_id.0,
                        mutant_id = id.0,
                        "update for a mutant outside the batch"
                    );
                    continue;
                };
                let status =
                    mutant.analyze_test_run(&update.failing, &update.executed, &update.timed_out);
                if status.is_terminal() && reported.insert(*id) {
                    send(events, MutationEvent::tested(mutant, Some(batch_id)));
                }
            }
            let pending = batch
                .mutants()
                .iter()
                .any(|m| m.status() == MutantStatus::NotRun);
            if pending || !early_abort {
                RunControl::Continue
            } else {
                RunControl::Stop
            }
        };
        panic::catch_unwind(AssertUnwindSafe(|| runner.run_batch(&request, &mut on_update)))
    };

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            error!(batch_id = batch_id.0, error = %err, "test run failed");
            Some(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(batch_id = batch_id.0, panic = %message, "test runner panicked");
            Some(format!("runner panicked: {message}"))
        }
    };

    let mut incomplete = Vec::new();
    for mutant in batch.mutants_mut() {
        if mutant.status() != MutantStatus::NotRun {
            continue;
        }
        warn!(batch_id = batch_id.0, mutant_id = mutant.id.0, "mutant was not fully tested");
        mutant.note_incomplete(match &error {
            Some(err) => format!("Test run failed: {err}"),
            None => "Not fully tested".to_string(),
        });
        incomplete.push(mutant.id);
        send(
            events,
            MutationEvent::MutantIncomplete {
                timestamp_ms: now_timestamp_ms(),
                batch_id,
                mutant_id: mutant.id,
            },
        );
    }

    let duration = started.elapsed();
    send(
        events,
        MutationEvent::BatchFinished {
            timestamp_ms: now_timestamp_ms(),
            batch_id,
            error: error.clone(),
            duration_ms: duration_ms(duration),
        },
    );
    debug!(batch_id = batch_id.0, elapsed_ms = duration_ms(duration), "batch finished");

    BatchOutcome {
        batch,
        report: BatchReport {
            batch_id,
            mutants: mutant_ids,
            error,
            incomplete,
            duration,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn consume_events(
    mut rx: UnboundedReceiver<MutationEvent>,
    reporter: Arc<dyn Reporter>,
) -> ScoreAggregator {
    let mut tally = ScoreAggregator::new();
    while let Some(event) = rx.blocking_recv() {
        if let MutationEvent::MutantTested { status, .. } = &event {
            tally.record(*status);
            debug!(
                tested = tally.total(),
                detected = tally.detected(),
                "mutation progress"
            );
        }
        reporter.report(&event);
    }
    tally
}
