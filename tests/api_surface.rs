use std::sync::Arc;

use mutant_sched::prelude::*;
use mutant_sched::{CollectingReporter, ExecutionCoordinator};

/// Runs the whole suite; each listed test fails while its mutant is active.
struct Killers(Vec<(MutantId, &'static str)>);

impl TestRunner for Killers {
    fn run_batch(
        &self,
        request: &BatchRequest,
        on_update: &mut dyn FnMut(TestRunUpdate) -> RunControl,
    ) -> Result<(), TestRunnerError> {
        let failing: TestSet = self
            .0
            .iter()
            .filter(|(id, _)| request.mutants.contains(id))
            .map(|(_, test)| *test)
            .collect();
        on_update(TestRunUpdate {
            tested_mutants: request.mutants.clone(),
            failing,
            executed: TestSet::every(),
            timed_out: TestSet::empty(),
        });
        Ok(())
    }
}

fn set(names: &[&str]) -> TestSet {
    names.iter().copied().collect()
}

#[test]
fn prelude_exports_scheduling_core() {
    let mutants = vec![
        Mutant::new(MutantId(1), "a").with_covering_tests(set(&["t1", "t2"])),
        Mutant::new(MutantId(2), "b").with_covering_tests(set(&["t3", "t4"])),
        Mutant::new(MutantId(3), "c").with_covering_tests(set(&["t5", "t6"])),
    ];
    let batches: Vec<Batch> = BatchBuilder::new(true).build(mutants.clone()).collect();
    assert_eq!(batches.len(), 1);

    let singletons = BatchBuilder::from_config(&MutationConfig::default().with_batching(false))
        .build(mutants)
        .count();
    assert_eq!(singletons, 3);

    assert!(ScoreAggregator::new().score().is_nan());
}

#[tokio::test]
async fn coordinator_reports_each_mutant_once() {
    let runner = Arc::new(Killers(vec![(MutantId(2), "t3")]));
    let reporter = Arc::new(CollectingReporter::new());
    let mutants = vec![
        Mutant::new(MutantId(1), "a").with_covering_tests(set(&["t1", "t2"])),
        Mutant::new(MutantId(2), "b").with_covering_tests(set(&["t3", "t2"])),
        Mutant::new(MutantId(3), "c").with_covering_tests(set(&["t4"])),
    ];
    let config = MutationConfig::default().with_max_parallelism(2);

    let result = ExecutionCoordinator::new(runner, &config)
        .execute(BatchBuilder::from_config(&config).build(mutants), reporter.clone())
        .await
        .expect("execution should succeed");

    // 1 and 2 share t2, so they cannot share a batch.
    assert_eq!(result.batches.len(), 2);
    assert_eq!(reporter.tested().len(), 3);
    assert_eq!(result.mutants[1].status(), MutantStatus::Killed);
    assert_eq!(result.mutants[1].status_reason(), Some("Killed by t3"));
    assert!((result.reported.score() - 1.0 / 3.0).abs() < 1e-12);
}

#[tokio::test]
async fn process_scores_ignored_mutants_out_of_the_denominator() {
    let runner = Arc::new(Killers(vec![(MutantId(1), "t1"), (MutantId(2), "t2")]));
    let reporter = Arc::new(CollectingReporter::new());
    let mut ignored = Mutant::new(MutantId(4), "d");
    ignored
        .ignore("excluded by the user")
        .expect("fresh mutant should be ignorable");
    let mutants = vec![
        Mutant::new(MutantId(1), "a"),
        Mutant::new(MutantId(2), "b"),
        Mutant::new(MutantId(3), "c"),
        ignored,
    ];
    let coverage = StaticCoverage::new(CoverageReport::passed(
        [
            (MutantId(1), set(&["t1"])),
            (MutantId(2), set(&["t2"])),
            (MutantId(3), set(&["t3"])),
        ]
        .into_iter()
        .collect(),
    ));

    let result = MutationTestProcess::new(MutationConfig::default(), runner, reporter.clone())
        .run(mutants, &BuildOutcome::clean(), &coverage)
        .await
        .expect("run should succeed");

    assert_eq!(result.summary.killed, 2);
    assert_eq!(result.summary.survived, 1);
    assert_eq!(result.summary.ignored, 1);
    assert!((result.score() - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(reporter.tested().len(), 4);
    assert_eq!(result.batches.len(), 1);
}
