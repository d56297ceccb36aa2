//! Error taxonomy for loading, cataloguing, planning, binding, and running.

use std::fmt;
use thiserror::Error;

/// Errors raised by the orchestration core and its wrappers.
#[derive(Debug, Error)]
pub enum StackError {
    /// Malformed or missing configuration, detected before planning
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Descriptor table failed static validation
    #[error("catalog error: {0}")]
    Catalog(String),

    /// An enabled unit depends on a disabled or absent unit
    #[error("unit '{unit}' depends on '{dependency}', which is disabled or absent")]
    DependencyUnsatisfied { unit: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected involving: {}", .units.join(", "))]
    CycleDetected { units: Vec<String> },

    /// A unit recorded its handles twice in one run
    #[error("unit '{0}' already recorded its handles in this run")]
    DuplicateUnit(String),

    /// A unit was not recorded yet, or did not publish the handle
    #[error("unit '{unit}' has no handle '{handle}'")]
    MissingHandle { unit: String, handle: String },

    /// No builder is registered for a planned unit
    #[error("no builder registered for unit '{0}'")]
    MissingBuilder(String),

    /// Planning and execution disagree
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The unit builder reported an error
    #[error("unit '{unit}' failed to build: {source}")]
    UnitBuildFailure {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    /// The run was cancelled between units
    #[error("run cancelled")]
    Cancelled,

    /// Lock file or event log I/O
    #[error("state error: {0}")]
    State(String),
}

/// Result type for core operations.
pub type StackResult<T> = Result<T, StackError>;

/// Step of the run state machine at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Planning,
    Executing,
    Cancelled,
    /// Every unit built; recording the run failed
    Persisting,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Persisting => write!(f, "persisting"),
        }
    }
}

/// A failed run: the root cause plus the units that completed before it.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {error}", at_unit(.unit))]
pub struct RunFailure {
    pub stage: RunStage,

    /// Unit that failed, if the failure is attributable to one
    pub unit: Option<String>,

    /// Plan prefix that completed, in order
    pub completed: Vec<String>,

    #[source]
    pub error: StackError,
}

fn at_unit(unit: &Option<String>) -> String {
    match unit {
        Some(u) => format!(" at unit '{}'", u),
        None => String::new(),
    }
}

impl RunFailure {
    /// Planning failures build nothing; the dependent unit is named when known.
    pub fn planning(error: StackError) -> Self {
        let unit = match &error {
            StackError::DependencyUnsatisfied { unit, .. } => Some(unit.clone()),
            _ => None,
        };
        Self {
            stage: RunStage::Planning,
            unit,
            completed: Vec::new(),
            error,
        }
    }
}
