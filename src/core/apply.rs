//! SP-013: Apply: plan, run the orchestrator, persist the result.
//!
//! load lock → plan → report → orchestrate (observed by the event log) → lock

use super::catalog::Catalog;
use super::error::{RunFailure, RunStage};
use super::executor::{BuilderRegistry, CancelToken, NoopObserver, Orchestrator, RunObserver, RunOutcome};
use super::planner::{self, PlanReport};
use super::resolver;
use super::state;
use super::types::StackConfig;
use crate::tripwire::eventlog::{self, EventLog};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration for an apply run.
pub struct ApplyConfig<'a> {
    pub config: &'a StackConfig,
    pub catalog: &'a Catalog,
    pub builders: &'a BuilderRegistry,
    pub state_dir: &'a Path,
    pub dry_run: bool,
    /// Overrides `policy.parallel` when set
    pub parallel: Option<bool>,
    pub cancel: Option<CancelToken>,
}

/// What an apply did.
#[derive(Debug)]
pub struct ApplyResult {
    pub run_id: String,
    pub report: PlanReport,
    /// None for dry runs
    pub outcome: Option<RunOutcome>,
    /// Where the run lock was written, if it was
    pub lock_path: Option<PathBuf>,
    pub total_duration: Duration,
}

/// Execute the apply loop.
pub fn apply(cfg: &ApplyConfig<'_>) -> Result<ApplyResult, RunFailure> {
    let start = Instant::now();
    let config = cfg.config;

    let previous = state::load_lock(cfg.state_dir, &config.name).map_err(RunFailure::planning)?;
    let plan = resolver::build_execution_plan(cfg.catalog, config).map_err(RunFailure::planning)?;
    let report = planner::plan(cfg.catalog, config, &plan, previous.as_ref());
    let run_id = eventlog::generate_run_id();

    if cfg.dry_run {
        info!(stack = %config.name, units = plan.len(), "dry run, nothing built");
        return Ok(ApplyResult {
            run_id,
            report,
            outcome: None,
            lock_path: None,
            total_duration: start.elapsed(),
        });
    }

    let mut orchestrator = Orchestrator::new(cfg.catalog, cfg.builders)
        .parallel(cfg.parallel.unwrap_or(config.policy.parallel));
    if let Some(token) = &cfg.cancel {
        orchestrator = orchestrator.with_cancel(token.clone());
    }

    let mut event_log = EventLog::new(cfg.state_dir, &config.name, &run_id);
    let mut noop = NoopObserver;
    let observer: &mut dyn RunObserver = if config.policy.event_log {
        &mut event_log
    } else {
        &mut noop
    };
    let outcome = orchestrator.run_observed(config, observer)?;

    if event_log.write_errors() > 0 {
        warn!(errors = event_log.write_errors(), "event log incomplete");
    }

    let lock_path = if config.policy.lock_file {
        let lock = state::lock_from_outcome(config, cfg.catalog, &outcome, &run_id);
        state::save_lock(cfg.state_dir, &lock).map_err(|error| RunFailure {
            stage: RunStage::Persisting,
            unit: None,
            completed: outcome.plan.order.clone(),
            error,
        })?;
        Some(state::lock_file_path(cfg.state_dir, &config.name))
    } else {
        None
    };

    Ok(ApplyResult {
        run_id,
        report,
        outcome: Some(outcome),
        lock_path,
        total_duration: start.elapsed(),
    })
}
