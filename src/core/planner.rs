//! SP-012: Change report: diff the desired plan against the last run lock.
//!
//! The resolver decides *what* runs and in which order; this module explains
//! the plan to a human: which wave each unit lands in, which handles are wired
//! into it, and whether it is new, changed, unchanged, or gone since the last
//! recorded run.

use super::catalog::Catalog;
use super::types::*;
use crate::tripwire::hasher;
use serde::Serialize;
use std::fmt;

/// What a run would do to a unit compared with the last recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    NoOp,
    Destroy,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::NoOp => " ",
            Self::Destroy => "-",
        };
        write!(f, "{}", symbol)
    }
}

/// One enabled unit as it would run.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedUnit {
    pub unit: String,
    pub category: Category,
    pub wave: usize,
    /// Enabled dependencies, in declaration order
    pub depends_on: Vec<String>,
    /// Handles wired in from dependencies, as `unit.handle`
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub change: ChangeKind,
    pub description: String,
}

/// Human- and machine-readable description of a prospective run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub stack: String,
    pub config_hash: String,
    pub waves: Vec<Vec<String>>,
    pub units: Vec<PlannedUnit>,
    /// Units recorded by the last run that are no longer enabled, teardown order
    pub destroy: Vec<String>,
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl PlanReport {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_destroy > 0
    }

    /// Unit names in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.unit.as_str()).collect()
    }
}

/// Describe `plan` relative to `previous`, the lock of the last run if any.
pub fn plan(
    catalog: &Catalog,
    config: &StackConfig,
    plan: &ExecutionPlan,
    previous: Option<&RunLock>,
) -> PlanReport {
    let mut report = PlanReport {
        stack: config.name.clone(),
        config_hash: hasher::hash_config(config),
        waves: plan.waves.clone(),
        units: Vec::with_capacity(plan.len()),
        destroy: Vec::new(),
        to_create: 0,
        to_update: 0,
        to_destroy: 0,
        unchanged: 0,
    };

    for unit in &plan.order {
        let Some(descriptor) = catalog.get(unit) else {
            continue;
        };
        let change = determine_change(config, unit, descriptor.category, previous);
        match change {
            ChangeKind::Create => report.to_create += 1,
            ChangeKind::Update => report.to_update += 1,
            ChangeKind::NoOp => report.unchanged += 1,
            ChangeKind::Destroy => report.to_destroy += 1,
        }

        let depends_on = descriptor
            .depends_on
            .iter()
            .filter(|d| plan.contains(&d.unit))
            .map(|d| d.unit.clone())
            .collect();
        let inputs = descriptor
            .bound_requirements(|dep| plan.contains(dep))
            .iter()
            .map(HandleRef::to_string)
            .collect();

        report.units.push(PlannedUnit {
            unit: unit.clone(),
            category: descriptor.category,
            wave: wave_of(plan, unit),
            depends_on,
            inputs,
            outputs: descriptor.produces.clone(),
            change,
            description: describe_change(unit, descriptor.category, change),
        });
    }

    if let Some(lock) = previous {
        for unit in lock.order.iter().rev() {
            if !plan.contains(unit) && lock.units.contains_key(unit) {
                report.destroy.push(unit.clone());
                report.to_destroy += 1;
            }
        }
    }

    report
}

fn determine_change(
    config: &StackConfig,
    unit: &str,
    category: Category,
    previous: Option<&RunLock>,
) -> ChangeKind {
    let Some(recorded) = previous.and_then(|lock| lock.units.get(unit)) else {
        return ChangeKind::Create;
    };
    if recorded.hash == hasher::hash_unit(config, unit, category) {
        ChangeKind::NoOp
    } else {
        ChangeKind::Update
    }
}

fn wave_of(plan: &ExecutionPlan, unit: &str) -> usize {
    plan.waves
        .iter()
        .position(|wave| wave.iter().any(|u| u == unit))
        .unwrap_or_default()
}

fn describe_change(unit: &str, category: Category, change: ChangeKind) -> String {
    match change {
        ChangeKind::Create => format!("{}: create {} resources", unit, category),
        ChangeKind::Update => format!("{}: update ({} configuration changed)", unit, category),
        ChangeKind::NoOp => format!("{}: no changes", unit),
        ChangeKind::Destroy => format!("{}: destroy", unit),
    }
}
