//! SP-004: Dependency planning over the enabled-unit subgraph.
//!
//! Evaluates every unit's enablement predicate once, checks that each enabled
//! unit's required dependencies are enabled too, and computes a topological
//! order using Kahn's algorithm. Among units that are ready at the same time
//! the one declared first in the catalog wins, so identical inputs always
//! yield identical plans.

use super::catalog::{Catalog, DependencyKind};
use super::error::{StackError, StackResult};
use super::types::{ExecutionPlan, OrderingEdge, StackConfig};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Evaluate enablement for every catalog entry, in declaration order.
pub fn enabled_units<'a>(catalog: &'a Catalog, config: &StackConfig) -> Vec<&'a str> {
    catalog
        .units()
        .iter()
        .filter(|u| u.is_enabled(config))
        .map(|u| u.name.as_str())
        .collect()
}

/// Build the execution plan for one run. Pure function of its inputs.
pub fn build_execution_plan(catalog: &Catalog, config: &StackConfig) -> StackResult<ExecutionPlan> {
    let units = catalog.units();
    let enabled: Vec<bool> = units.iter().map(|u| u.is_enabled(config)).collect();

    // Edges among enabled units: deps[i] are the enabled dependencies of i
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for (i, unit) in units.iter().enumerate() {
        if !enabled[i] {
            continue;
        }
        for dep in &unit.depends_on {
            let present = catalog.index_of(&dep.unit).filter(|&j| enabled[j]);
            match (present, dep.kind) {
                (Some(j), _) => {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
                (None, DependencyKind::Required) => {
                    return Err(StackError::DependencyUnsatisfied {
                        unit: unit.name.clone(),
                        dependency: dep.unit.clone(),
                    });
                }
                (None, DependencyKind::Optional) => {}
            }
        }
    }

    // Kahn's algorithm; the ready set is ordered by declaration index
    let mut in_degree: FxHashMap<usize, usize> = FxHashMap::default();
    let mut ready: BTreeSet<usize> = BTreeSet::new();
    for i in (0..units.len()).filter(|&i| enabled[i]) {
        in_degree.insert(i, deps[i].len());
        if deps[i].is_empty() {
            ready.insert(i);
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(in_degree.len());
    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &dependents[current] {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(next);
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let units = (0..units.len())
            .filter(|i| enabled[*i] && !placed.contains(i))
            .map(|i| units[i].name.clone())
            .collect();
        return Err(StackError::CycleDetected { units });
    }

    let edges = order
        .iter()
        .flat_map(|&i| {
            deps[i].iter().map(move |&j| OrderingEdge {
                before: units[j].name.clone(),
                after: units[i].name.clone(),
            })
        })
        .collect();

    Ok(ExecutionPlan {
        order: order.iter().map(|&i| units[i].name.clone()).collect(),
        edges,
        waves: compute_waves(&order, &deps)
            .into_iter()
            .map(|wave| wave.into_iter().map(|i| units[i].name.clone()).collect())
            .collect(),
    })
}

/// Group ordered units into waves: a unit's wave is one past the deepest
/// wave among its dependencies. Plan order is kept within a wave.
fn compute_waves(order: &[usize], deps: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut level: FxHashMap<usize, usize> = FxHashMap::default();
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for &i in order {
        let wave = deps[i]
            .iter()
            .filter_map(|j| level.get(j))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        level.insert(i, wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(i);
    }
    waves
}
