//! SP-009: Append-only JSONL provenance event log.
//!
//! One file per stack. [`EventLog`] plugs into the orchestrator as a
//! [`RunObserver`] so every state transition of a run leaves a line.

use crate::core::error::{RunFailure, StackError};
use crate::core::executor::{RunObserver, RunOutcome};
use crate::core::types::{ExecutionPlan, HandleMap, ProvenanceEvent, TimestampedEvent};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Generate an ISO 8601 timestamp.
pub fn now_iso8601() -> String {
    // Manual UTC conversion, no chrono dependency
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    // Simple UTC conversion (good enough, no TZ complexity)
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    // Days since epoch to Y-M-D (simplified Gregorian)
    let mut y = 1970i64;
    let mut remaining = days as i64;
    loop {
        let year_days = if is_leap(y) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        y += 1;
    }
    let leap = is_leap(y);
    let month_days = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut m = 0;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md as i64 {
            m = i + 1;
            break;
        }
        remaining -= md as i64;
    }
    let d = remaining + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y, m, d, hours, minutes, seconds
    )
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the event log path for a stack.
pub fn event_log_path(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack).join("events.jsonl")
}

/// Append an event to the stack's event log.
pub fn append_event(state_dir: &Path, stack: &str, event: ProvenanceEvent) -> Result<(), String> {
    let path = event_log_path(state_dir, stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("cannot create state dir: {}", e))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read every event of a stack's log, oldest first. Missing log = no events.
pub fn read_events(state_dir: &Path, stack: &str) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(state_dir, stack);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;
    let mut events = Vec::new();
    for (n, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("read error: {}", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: invalid event: {}", path.display(), n + 1, e))?;
        events.push(event);
    }
    Ok(events)
}

/// Run observer writing provenance events for one run.
///
/// Write failures never abort the run; they are logged and counted.
pub struct EventLog<'a> {
    state_dir: &'a Path,
    stack: String,
    run_id: String,
    write_errors: u32,
}

impl<'a> EventLog<'a> {
    pub fn new(state_dir: &'a Path, stack: &str, run_id: &str) -> Self {
        Self {
            state_dir,
            stack: stack.to_string(),
            run_id: run_id.to_string(),
            write_errors: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    fn log(&mut self, event: ProvenanceEvent) {
        if let Err(e) = append_event(self.state_dir, &self.stack, event) {
            warn!(stack = %self.stack, error = %e, "event log write failed");
            self.write_errors += 1;
        }
    }
}

impl RunObserver for EventLog<'_> {
    fn run_started(&mut self, plan: &ExecutionPlan, config_hash: &str) {
        self.log(ProvenanceEvent::RunStarted {
            stack: self.stack.clone(),
            run_id: self.run_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: config_hash.to_string(),
            plan: plan.order.clone(),
        });
    }

    fn unit_started(&mut self, unit: &str) {
        self.log(ProvenanceEvent::UnitStarted {
            run_id: self.run_id.clone(),
            unit: unit.to_string(),
        });
    }

    fn unit_completed(&mut self, unit: &str, handles: &HandleMap, duration_seconds: f64) {
        self.log(ProvenanceEvent::UnitCompleted {
            run_id: self.run_id.clone(),
            unit: unit.to_string(),
            handles: handles.keys().cloned().collect(),
            duration_seconds,
        });
    }

    fn unit_failed(&mut self, unit: &str, error: &StackError) {
        self.log(ProvenanceEvent::UnitFailed {
            run_id: self.run_id.clone(),
            unit: unit.to_string(),
            error: error.to_string(),
        });
    }

    fn run_completed(&mut self, outcome: &RunOutcome, total_seconds: f64) {
        self.log(ProvenanceEvent::RunCompleted {
            run_id: self.run_id.clone(),
            units: outcome.handles.len() as u32,
            total_seconds,
        });
    }

    fn run_failed(&mut self, failure: &RunFailure) {
        self.log(ProvenanceEvent::RunFailed {
            run_id: self.run_id.clone(),
            stage: failure.stage.to_string(),
            unit: failure.unit.clone(),
            completed: failure.completed.clone(),
            error: failure.error.to_string(),
        });
    }
}
