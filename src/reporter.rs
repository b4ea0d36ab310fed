//! Observers of mutation events.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::MutationEvent;
use crate::mutant::{MutantId, MutantStatus};

/// Event sink. Implementations must tolerate calls from any thread.
///
/// Runs get events on a blocking thread, so reporters may write files directly.
pub trait Reporter: Send + Sync {
    /// Observe one event.
    fn report(&self, event: &MutationEvent);
}

impl<R: Reporter + ?Sized> Reporter for std::sync::Arc<R> {
    fn report(&self, event: &MutationEvent) {
        (**self).report(event);
    }
}

/// Reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &MutationEvent) {}
}

/// Reporter keeping every event in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<MutationEvent>>,
}

impl CollectingReporter {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events seen so far.
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Final statuses in arrival order.
    pub fn tested(&self) -> Vec<(MutantId, MutantStatus)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MutationEvent::MutantTested {
                    mutant_id, status, ..
                } => Some((mutant_id, status)),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: &MutationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Reporter logging through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &MutationEvent) {
        match event {
            MutationEvent::MutantTested {
                mutant_id,
                status,
                reason,
                ..
            } => info!(
                mutant_id = mutant_id.0,
                %status,
                reason = reason.as_deref().unwrap_or(""),
                "mutant tested"
            ),
            MutationEvent::MutantIncomplete {
                batch_id,
                mutant_id,
                ..
            } => warn!(batch_id = batch_id.0, mutant_id = mutant_id.0, "mutant not fully tested"),
            other => debug!(event = ?other, "mutation event"),
        }
    }
}

/// Event log errors.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reporter appending events to a JSON-lines file.
#[derive(Debug)]
pub struct JsonlReporter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlReporter {
    /// Open (or create) `path` for appending.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &MutationEvent) -> Result<(), EventLogError> {
        let json = serde_json::to_string(event).map_err(std::io::Error::from)?;
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

impl Reporter for JsonlReporter {
    fn report(&self, event: &MutationEvent) {
        if let Err(err) = self.append(event) {
            warn!(path = %self.path.display(), error = %err, "failed to append mutation event");
        }
    }
}

/// Events read back from a JSON-lines log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventLog {
    /// Parsed events in file order.
    pub events: Vec<MutationEvent>,
    /// Number of malformed lines skipped.
    pub malformed_lines: usize,
}

/// Read an event log written by [`JsonlReporter`]. Malformed lines are counted and skipped.
pub fn read_events(path: &Path) -> Result<EventLog, EventLogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut log = EventLog::default();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MutationEvent>(&line) {
            Ok(event) => log.events.push(event),
            Err(_) => log.malformed_lines += 1,
        }
    }
    Ok(log)
}
