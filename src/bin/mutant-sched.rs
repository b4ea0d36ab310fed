use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use mutant_sched::{
    BatchBuilder, CommandTestRunner, JsonlReporter, MutationConfig, MutationEvent,
    MutationTestProcess, PlannedBatch, ProcessError, ReportFormat, Reporter, RunPlan,
    TracingReporter, prepare_mutants, read_events, render_plan, render_report,
};

#[derive(Debug, Parser)]
#[command(name = "mutant-sched")]
#[command(about = "Coverage-driven batch scheduling for mutation testing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the batches a plan would run, without running them.
    Plan {
        /// Plan file (JSON).
        #[arg(long)]
        plan: PathBuf,
        /// Config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run every mutant on its own.
        #[arg(long)]
        no_batching: bool,
    },
    /// Execute a plan against a test command.
    Run {
        /// Plan file (JSON).
        #[arg(long)]
        plan: PathBuf,
        /// Test command, started once per batch.
        #[arg(long)]
        command: String,
        /// Arguments passed to the test command.
        #[arg(last = true)]
        args: Vec<String>,
        /// Config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Maximum concurrently running batches.
        #[arg(long)]
        parallelism: Option<usize>,
        /// Keep running a batch after all of its mutants are resolved.
        #[arg(long)]
        no_early_abort: bool,
        /// Run every mutant on its own.
        #[arg(long)]
        no_batching: bool,
        /// Optional substring filter on mutant labels.
        #[arg(long)]
        filter: Option<String>,
        /// Expected duration of one suite run, in seconds.
        #[arg(long, default_value_t = 60)]
        suite_timeout_secs: u64,
        /// Append events to this JSON-lines file.
        #[arg(long)]
        events: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value = "md")]
        format: OutputFormat,
    },
    /// Summarize a recorded event log.
    Events {
        /// Event log (JSON lines).
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Markdown
    Md,
    /// JSON
    Json,
}

struct Overrides {
    parallelism: Option<usize>,
    no_early_abort: bool,
    no_batching: bool,
    filter: Option<String>,
}

fn make_config(path: Option<&Path>, overrides: Overrides) -> Result<MutationConfig> {
    let mut config = match path {
        Some(path) => MutationConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MutationConfig::default(),
    };
    if let Some(parallelism) = overrides.parallelism {
        config = config.with_max_parallelism(parallelism);
    }
    if overrides.no_early_abort {
        config = config.with_early_abort(false);
    }
    if overrides.no_batching {
        config = config.with_batching(false);
    }
    if let Some(filter) = overrides.filter {
        config = config.with_filter(filter);
    }
    Ok(config.validate()?)
}

/// Forwards events to the log and, optionally, an event file.
struct CliReporter {
    log: TracingReporter,
    file: Option<JsonlReporter>,
}

impl Reporter for CliReporter {
    fn report(&self, event: &MutationEvent) {
        self.log.report(event);
        if let Some(file) = &self.file {
            file.report(event);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Plan {
            plan,
            config,
            no_batching,
        } => {
            let config = make_config(
                config.as_deref(),
                Overrides {
                    parallelism: None,
                    no_early_abort: false,
                    no_batching,
                    filter: None,
                },
            )?;
            let plan = RunPlan::load(&plan)
                .with_context(|| format!("failed to load plan {}", plan.display()))?;
            let mutants = prepare_mutants(
                &config,
                plan.mutants.clone(),
                &plan.build_failures,
                &plan.coverage(),
            )?;
            let pending = mutants
                .into_iter()
                .filter(|m| !m.status().is_terminal())
                .collect();
            let planned: Vec<PlannedBatch> = BatchBuilder::from_config(&config)
                .build(pending)
                .map(|batch| PlannedBatch::from(&batch))
                .collect();
            println!("{}", render_plan(&planned));
        }
        Command::Run {
            plan,
            command,
            args,
            config,
            parallelism,
            no_early_abort,
            no_batching,
            filter,
            suite_timeout_secs,
            events,
            format,
        } => {
            let config = make_config(
                config.as_deref(),
                Overrides {
                    parallelism,
                    no_early_abort,
                    no_batching,
                    filter,
                },
            )?;
            let plan = RunPlan::load(&plan)
                .with_context(|| format!("failed to load plan {}", plan.display()))?;
            let runner = CommandTestRunner::new(command)
                .with_args(args)
                .with_suite_timeout(Duration::from_secs(suite_timeout_secs));
            let file = events
                .map(|path| {
                    JsonlReporter::create(&path)
                        .with_context(|| format!("failed to open event log {}", path.display()))
                })
                .transpose()?;
            let reporter = CliReporter {
                log: TracingReporter,
                file,
            };

            let process = MutationTestProcess::new(config, Arc::new(runner), Arc::new(reporter));
            let coverage = plan.coverage();
            let result = match process
                .run(plan.mutants, &plan.build_failures, &coverage)
                .await
            {
                Ok(result) => result,
                Err(ProcessError::ControlRunFailed(message)) => {
                    error!(%message, "control run failed, no mutant was tested");
                    eprintln!("control run failed: {message}");
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            };

            let format = match format {
                OutputFormat::Md => ReportFormat::Markdown,
                OutputFormat::Json => ReportFormat::Json,
            };
            println!("{}", render_report(&result, format));
        }
        Command::Events { log } => {
            let log = read_events(&log)
                .with_context(|| format!("failed to read event log {}", log.display()))?;
            let mut tested = 0usize;
            let mut score = None;
            for event in &log.events {
                match event {
                    MutationEvent::MutantTested { .. } => tested += 1,
                    MutationEvent::RunCompleted { score: s, .. } => score = *s,
                    _ => {}
                }
            }
            println!("events: {}", log.events.len());
            println!("malformed lines: {}", log.malformed_lines);
            println!("mutants tested: {tested}");
            match score {
                Some(score) => println!("mutation score: {:.2}%", score * 100.0),
                None => println!("mutation score: n/a"),
            }
        }
    }

    Ok(())
}
