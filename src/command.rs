//! Test runner driving an external test command.
//!
//! The command is started once per batch with the active mutant ids in
//! [`ACTIVE_MUTANTS_ENV`]. Each stdout line of the form
//! `{"test": "<name>", "outcome": "passed" | "failed" | "timeout"}` is folded into the run's
//! cumulative result and delivered as one update. Other lines are ignored.

use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::coverage::{TestId, TestSet};
use crate::mutant::MutantId;
use crate::runner::{BatchRequest, RunControl, TestRunUpdate, TestRunner, TestRunnerError};

/// Comma-separated ids of the mutants active in the run.
pub const ACTIVE_MUTANTS_ENV: &str = "MUTANT_SCHED_ACTIVE";
/// Comma-separated names of the tests the run needs. Unset when the whole suite is needed.
pub const SELECTED_TESTS_ENV: &str = "MUTANT_SCHED_TESTS";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LineOutcome {
    Passed,
    Failed,
    Timeout,
}

#[derive(Debug, Deserialize)]
struct TestLine {
    test: String,
    outcome: LineOutcome,
}

#[derive(Debug, Default)]
struct RunProgress {
    failing: TestSet,
    executed: TestSet,
    timed_out: TestSet,
}

impl RunProgress {
    fn record(&mut self, line: TestLine) {
        let test = TestId::new(line.test);
        match line.outcome {
            LineOutcome::Passed => self.executed.insert(test),
            LineOutcome::Failed => {
                self.failing.insert(test.clone());
                self.executed.insert(test);
            }
            LineOutcome::Timeout => self.timed_out.insert(test),
        }
    }

    fn update(&self, mutants: &[MutantId]) -> TestRunUpdate {
        TestRunUpdate {
            tested_mutants: mutants.to_vec(),
            failing: self.failing.clone(),
            executed: self.executed.clone(),
            timed_out: self.timed_out.clone(),
        }
    }
}

/// Runs an external command once per batch.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    program: OsString,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    suite_timeout: Duration,
}

impl CommandTestRunner {
    /// Runner invoking `program` without arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            suite_timeout: Duration::from_secs(60),
        }
    }

    /// Append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command in `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Expected duration of one suite run. The batch timeout adds the request's slack.
    pub fn with_suite_timeout(mut self, timeout: Duration) -> Self {
        self.suite_timeout = timeout;
        self
    }

    fn command(&self, request: &BatchRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(ACTIVE_MUTANTS_ENV, join_ids(&request.mutants))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        match &request.tests {
            TestSet::Tests(tests) => {
                let names: Vec<&str> = tests.iter().map(TestId::as_str).collect();
                cmd.env(SELECTED_TESTS_ENV, names.join(","));
            }
            TestSet::Every => {
                cmd.env_remove(SELECTED_TESTS_ENV);
            }
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn join_ids(ids: &[MutantId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn terminate(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "test process already exited");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap test process");
    }
}

impl TestRunner for CommandTestRunner {
    fn run_batch(
        &self,
        request: &BatchRequest,
        on_update: &mut dyn FnMut(TestRunUpdate) -> RunControl,
    ) -> Result<(), TestRunnerError> {
        let mut child = self.command(request).spawn().map_err(|err| {
            TestRunnerError::Spawn(format!("{}: {err}", self.program.to_string_lossy()))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TestRunnerError::Output("stdout was not captured".to_string()))?;

        let (lines_tx, lines_rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        });

        // A budget past what `Instant` can represent means no deadline.
        let deadline = self
            .suite_timeout
            .checked_add(request.timeout)
            .and_then(|budget| Instant::now().checked_add(budget));
        let mut progress = RunProgress::default();
        loop {
            let received = match deadline {
                Some(deadline) => {
                    lines_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => lines_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(line) => {
                    let Ok(result) = serde_json::from_str::<TestLine>(&line) else {
                        trace!(line = %line, "ignoring non-result output");
                        continue;
                    };
                    progress.record(result);
                    if on_update(progress.update(&request.mutants)) == RunControl::Stop {
                        debug!(mutants = %join_ids(&request.mutants), "stopping resolved test run");
                        terminate(&mut child);
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(mutants = %join_ids(&request.mutants), "test run timed out");
                    terminate(&mut child);
                    progress.timed_out = TestSet::every();
                    on_update(progress.update(&request.mutants));
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        // The process ran to the end: every selected test has been executed.
        progress.executed = TestSet::every();
        if !status.success() && progress.failing.is_empty() {
            debug!(status = %status, "test command failed without reporting a test");
            progress.failing = TestSet::every();
        }
        on_update(progress.update(&request.mutants));
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request(ids: &[u32], tests: TestSet) -> BatchRequest {
        BatchRequest {
            mutants: ids.iter().copied().map(MutantId).collect(),
            tests,
            timeout: Duration::from_millis(0),
        }
    }

    fn set(names: &str) -> TestSet {
        names.split(',').collect()
    }

    fn shell(script: &str) -> CommandTestRunner {
        CommandTestRunner::new("sh").with_args(["-c", script])
    }

    fn collect(
        runner: &CommandTestRunner,
        request: &BatchRequest,
        control: RunControl,
    ) -> (Result<(), TestRunnerError>, Vec<TestRunUpdate>) {
        let mut updates = Vec::new();
        let result = runner.run_batch(request, &mut |update: TestRunUpdate| {
            updates.push(update);
            control
        });
        (result, updates)
    }

    #[test]
    fn result_lines_become_cumulative_updates() {
        let runner = shell(
            r#"echo '{"test":"t1","outcome":"passed"}'
echo 'compiling...'
echo '{"test":"t2","outcome":"failed"}'"#,
        );
        let (result, updates) = collect(
            &runner,
            &request(&[1, 2], set("t1,t2")),
            RunControl::Continue,
        );
        result.expect("run should succeed");

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].executed, set("t1"));
        assert_eq!(updates[1].failing, set("t2"));
        assert_eq!(updates[1].tested_mutants, vec![MutantId(1), MutantId(2)]);
        assert!(updates[2].executed.is_every());
        assert_eq!(updates[2].failing, set("t2"));
    }

    #[test]
    fn active_mutants_and_tests_are_exported() {
        let runner = shell(
            r#"[ "$MUTANT_SCHED_ACTIVE" = "4,7" ] && [ "$MUTANT_SCHED_TESTS" = "a,b" ] || exit 1"#,
        );
        let (result, updates) = collect(
            &runner,
            &request(&[4, 7], set("a,b")),
            RunControl::Continue,
        );
        result.expect("run should succeed");
        assert_eq!(updates.len(), 1);
        assert!(updates[0].failing.is_empty(), "environment was not exported");
    }

    #[test]
    fn crash_without_results_fails_every_test() {
        let (result, updates) = collect(
            &shell("exit 3"),
            &request(&[1], TestSet::every()),
            RunControl::Continue,
        );
        result.expect("a failing exit is a test result, not a runner error");
        assert_eq!(updates.len(), 1);
        assert!(updates[0].failing.is_every());
    }

    #[test]
    fn stop_kills_the_process() {
        let runner = shell(
            r#"echo '{"test":"t1","outcome":"failed"}'
sleep 5"#,
        );
        let started = Instant::now();
        let (result, updates) = collect(
            &runner,
            &request(&[1], TestSet::every()),
            RunControl::Stop,
        );
        result.expect("stopped run should succeed");
        assert_eq!(updates.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn slow_run_times_out_every_test() {
        let runner = shell("sleep 5").with_suite_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let (result, updates) = collect(
            &runner,
            &request(&[1], TestSet::every()),
            RunControl::Continue,
        );
        result.expect("timed out run should succeed");
        assert_eq!(updates.len(), 1);
        assert!(updates[0].timed_out.is_every());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let runner = CommandTestRunner::new("/nonexistent/mutant-sched-test-command");
        let (result, updates) = collect(
            &runner,
            &request(&[1], TestSet::every()),
            RunControl::Continue,
        );
        assert!(matches!(result, Err(TestRunnerError::Spawn(_))));
        assert!(updates.is_empty());
    }

    #[test]
    fn unrepresentable_timeout_runs_without_deadline() {
        let runner = shell(r#"echo '{"test":"t1","outcome":"passed"}'"#)
            .with_suite_timeout(Duration::from_secs(u64::MAX));
        let mut request = request(&[1], set("t1"));
        request.timeout = Duration::from_secs(u64::MAX);
        let (result, updates) = collect(&runner, &request, RunControl::Continue);
        result.expect("run without a deadline should succeed");
        let last = updates.last().expect("run should send a final update");
        assert!(last.executed.is_every());
        assert!(last.timed_out.is_empty());
    }
}
