//! Human and machine readable run reports.

use serde::Serialize;

use crate::batch::{Batch, BatchId};
use crate::coverage::TestSet;
use crate::events::duration_ms;
use crate::mutant::{MutantId, MutantStatus};
use crate::process::ProcessResult;
use crate::score::RunSummary;

/// Supported output formats for run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown summary.
    Markdown,
    /// JSON summary with all mutants inline.
    Json,
}

/// Per-mutant report entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutantReport {
    /// Mutant id.
    pub id: MutantId,
    /// Human-readable label.
    pub label: String,
    /// Final status.
    pub status: MutantStatus,
    /// Diagnostic for the status.
    pub reason: Option<String>,
}

/// Per-batch report entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Batch number.
    pub batch_id: BatchId,
    /// Mutants run together.
    pub mutants: Vec<MutantId>,
    /// Runner error, if the batch failed.
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// One planned batch, as printed before execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedBatch {
    /// Batch number.
    pub batch_id: BatchId,
    /// Mutants in the batch.
    pub mutants: Vec<MutantId>,
    /// Tests needed to assess them.
    pub tests: TestSet,
}

impl From<&Batch> for PlannedBatch {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id(),
            mutants: batch.mutant_ids(),
            tests: batch.tests(),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a RunSummary,
    batches: Vec<BatchSummary>,
    mutants: Vec<MutantReport>,
}

/// Render run report in requested format.
pub fn render_report(result: &ProcessResult, format: ReportFormat) -> String {
    let summary = &result.summary;
    let mutants: Vec<MutantReport> = result
        .mutants
        .iter()
        .map(|m| MutantReport {
            id: m.id,
            label: m.label.clone(),
            status: m.status(),
            reason: m.status_reason().map(str::to_string),
        })
        .collect();
    let batches: Vec<BatchSummary> = result
        .batches
        .iter()
        .map(|b| BatchSummary {
            batch_id: b.batch_id,
            mutants: b.mutants.clone(),
            error: b.error.clone(),
            duration_ms: duration_ms(b.duration),
        })
        .collect();

    match format {
        ReportFormat::Json => {
            let report = JsonReport {
                summary,
                batches,
                mutants,
            };
            serde_json::to_string_pretty(&report)
                .unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}"))
        }
        ReportFormat::Markdown => {
            let mut out = String::from("# Mutation Run\n\n");

            out.push_str("## Summary\n\n| metric | count |\n|---|---:|\n");
            out.push_str(&format!("| total | {} |\n", summary.total));
            out.push_str(&format!("| killed | {} |\n", summary.killed));
            out.push_str(&format!("| survived | {} |\n", summary.survived));
            out.push_str(&format!("| timeout | {} |\n", summary.timeout));
            out.push_str(&format!("| no coverage | {} |\n", summary.no_coverage));
            out.push_str(&format!("| ignored | {} |\n", summary.ignored));
            out.push_str(&format!("| compile error | {} |\n", summary.compile_error));
            out.push_str(&format!("| build error | {} |\n", summary.build_error));
            out.push_str(&format!("| incomplete | {} |\n", summary.incomplete));
            out.push_str(&format!("| batches | {} |\n", batches.len()));
            out.push_str(&format!(
                "| mutation score | {} |\n",
                summary.score_percent()
            ));

            let failed: Vec<&BatchSummary> =
                batches.iter().filter(|b| b.error.is_some()).collect();
            if !failed.is_empty() {
                out.push_str("\n## Failed batches\n\n");
                for b in failed {
                    out.push_str(&format!(
                        "- batch {} ({} mutants): {}\n",
                        b.batch_id,
                        b.mutants.len(),
                        b.error.as_deref().unwrap_or_default()
                    ));
                }
            }

            let notable: Vec<&MutantReport> = mutants
                .iter()
                .filter(|m| !m.status.is_detected())
                .collect();
            if !notable.is_empty() {
                out.push_str("\n## Undetected mutants\n\n");
                out.push_str("| id | status | label | reason |\n|---:|---|---|---|\n");
                for m in notable {
                    out.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        m.id,
                        m.status,
                        m.label,
                        m.reason.as_deref().unwrap_or_default()
                    ));
                }
            }

            out
        }
    }
}

/// Render planned batches as pretty JSON.
pub fn render_plan(batches: &[PlannedBatch]) -> String {
    serde_json::to_string_pretty(batches).unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::executor::BatchReport;
    use crate::mutant::Mutant;

    fn set(names: &[&str]) -> TestSet {
        names.iter().copied().collect()
    }

    fn result() -> ProcessResult {
        let mut killed =
            Mutant::new(MutantId(1), "replace + with -").with_covering_tests(set(&["t1"]));
        killed.analyze_test_run(&set(&["t1"]), &TestSet::every(), &TestSet::empty());
        let mut survived =
            Mutant::new(MutantId(2), "replace < with <=").with_covering_tests(set(&["t2"]));
        survived.analyze_test_run(&TestSet::empty(), &TestSet::every(), &TestSet::empty());
        let mutants = vec![killed, survived];
        ProcessResult {
            summary: RunSummary::from_mutants(&mutants),
            mutants,
            batches: vec![
                BatchReport {
                    batch_id: BatchId(0),
                    mutants: vec![MutantId(1), MutantId(2)],
                    error: None,
                    incomplete: Vec::new(),
                    duration: Duration::from_millis(12),
                },
                BatchReport {
                    batch_id: BatchId(1),
                    mutants: vec![MutantId(3)],
                    error: Some("failed to start test run".to_string()),
                    incomplete: vec![MutantId(3)],
                    duration: Duration::from_millis(1),
                },
            ],
        }
    }

    #[test]
    fn markdown_lists_summary_and_undetected_mutants() {
        let md = render_report(&result(), ReportFormat::Markdown);
        assert!(md.contains("| killed | 1 |"));
        assert!(md.contains("| mutation score | 50.00% |"));
        assert!(md.contains("## Failed batches"));
        assert!(md.contains("| 2 | survived | replace < with <= | All covering tests passed |"));
        assert!(!md.contains("replace + with -"));
    }

    #[test]
    fn json_report_contains_mutants_and_batches() {
        let json = render_report(&result(), ReportFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).expect("report should be JSON");
        assert_eq!(value["summary"]["killed"], 1);
        assert_eq!(value["mutants"][0]["status"], "killed");
        assert_eq!(value["mutants"][0]["reason"], "Killed by t1");
        assert_eq!(value["batches"][1]["error"], "failed to start test run");
        assert_eq!(value["batches"][0]["duration_ms"], 12);
    }

    #[test]
    fn plan_renders_tests_per_batch() {
        let batch = Batch::new(
            BatchId(0),
            vec![Mutant::new(MutantId(1), "a").with_covering_tests(set(&["t1"]))],
        );
        let json = render_plan(&[PlannedBatch::from(&batch)]);
        let value: serde_json::Value = serde_json::from_str(&json).expect("plan should be JSON");
        assert_eq!(value[0]["batch_id"], 0);
        assert_eq!(value[0]["mutants"][0], 1);
        assert_eq!(value[0]["tests"]["tests"][0], "t1");
    }
}
