//! SP-003: Unit descriptor table.
//!
//! Static metadata per unit: its category, enablement predicate, declared
//! dependencies, the handles it requires from those dependencies, and the
//! handles it publishes. A [`Catalog`] is validated once at construction:
//! names are unique, every dependency exists, every required handle is
//! published by a declared dependency, and the graph is acyclic.

use super::error::{StackError, StackResult};
use super::types::{Category, HandleRef, StackConfig};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Enablement predicate over the configuration model.
pub type Predicate = Arc<dyn Fn(&StackConfig) -> bool + Send + Sync>;

/// How strongly a unit needs one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// The dependent cannot be enabled without it
    Required,
    /// Ordered and wired only when the dependency is enabled
    Optional,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

/// A declared edge from a unit to one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub unit: String,
    pub kind: DependencyKind,
}

/// Static description of one unit.
#[derive(Clone)]
pub struct UnitDescriptor {
    pub name: String,
    pub category: Category,
    enabled_when: Predicate,
    pub depends_on: Vec<Dependency>,
    pub requires: Vec<HandleRef>,
    pub produces: Vec<String>,
}

impl fmt::Debug for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("depends_on", &self.depends_on)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

impl UnitDescriptor {
    /// A unit enabled by its category's flag, with no dependencies.
    pub fn new(name: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            category,
            enabled_when: Arc::new(move |config: &StackConfig| config.is_enabled(category)),
            depends_on: Vec::new(),
            requires: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// Replace the enablement predicate.
    pub fn enabled_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StackConfig) -> bool + Send + Sync + 'static,
    {
        self.enabled_when = Arc::new(predicate);
        self
    }

    pub fn depends_on(mut self, unit: &str) -> Self {
        self.depends_on.push(Dependency {
            unit: unit.to_string(),
            kind: DependencyKind::Required,
        });
        self
    }

    pub fn optionally_after(mut self, unit: &str) -> Self {
        self.depends_on.push(Dependency {
            unit: unit.to_string(),
            kind: DependencyKind::Optional,
        });
        self
    }

    pub fn requires(mut self, unit: &str, handles: &[&str]) -> Self {
        self.requires
            .extend(handles.iter().map(|h| HandleRef::new(unit, h)));
        self
    }

    pub fn produces(mut self, handles: &[&str]) -> Self {
        self.produces.extend(handles.iter().map(|h| h.to_string()));
        self
    }

    /// Evaluate the enablement predicate.
    pub fn is_enabled(&self, config: &StackConfig) -> bool {
        (self.enabled_when)(config)
    }

    /// Dependency declaration for `unit`, if any.
    pub fn dependency(&self, unit: &str) -> Option<&Dependency> {
        self.depends_on.iter().find(|d| d.unit == unit)
    }

    /// Handles to resolve for this unit, given which units are present in the run.
    /// Requirements on absent optional dependencies are dropped.
    pub fn bound_requirements<F>(&self, present: F) -> Vec<HandleRef>
    where
        F: Fn(&str) -> bool,
    {
        self.requires
            .iter()
            .filter(|r| present(&r.unit))
            .cloned()
            .collect()
    }
}

/// Validated, ordered table of unit descriptors.
#[derive(Debug, Clone)]
pub struct Catalog {
    units: Vec<UnitDescriptor>,
    index: IndexMap<String, usize>,
}

impl Catalog {
    /// Build and validate a catalog. Declaration order is preserved and used
    /// as the planner's tie-break.
    pub fn new(units: Vec<UnitDescriptor>) -> StackResult<Self> {
        let mut index = IndexMap::new();
        for (i, unit) in units.iter().enumerate() {
            if !is_valid_unit_name(&unit.name) {
                return Err(StackError::Catalog(format!(
                    "invalid unit name '{}'",
                    unit.name
                )));
            }
            if index.insert(unit.name.clone(), i).is_some() {
                return Err(StackError::Catalog(format!(
                    "unit '{}' declared twice",
                    unit.name
                )));
            }
        }
        let catalog = Self { units, index };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in table for the seven resource categories.
    pub fn standard() -> StackResult<Self> {
        Self::new(standard_units())
    }

    pub fn units(&self) -> &[UnitDescriptor] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UnitDescriptor> {
        self.index.get(name).map(|&i| &self.units[i])
    }

    /// Declaration position of a unit.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Every unit reachable through `depends_on` from `name`, following only
    /// dependencies for which `present` holds.
    pub fn ancestors<F>(&self, name: &str, present: F) -> IndexSet<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut seen = IndexSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(current) = stack.pop() {
            let Some(unit) = self.get(current) else {
                continue;
            };
            for dep in &unit.depends_on {
                if present(&dep.unit) && seen.insert(dep.unit.clone()) {
                    stack.push(&dep.unit);
                }
            }
        }
        seen
    }

    /// True when neither unit is an ancestor of the other among the units
    /// for which `present` holds.
    pub fn independent<F>(&self, a: &str, b: &str, present: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        a != b
            && !self.ancestors(a, &present).contains(b)
            && !self.ancestors(b, &present).contains(a)
    }

    fn validate(&self) -> StackResult<()> {
        for unit in &self.units {
            let mut seen_deps = BTreeSet::new();
            for dep in &unit.depends_on {
                if dep.unit == unit.name {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' depends on itself",
                        unit.name
                    )));
                }
                if !self.index.contains_key(&dep.unit) {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' depends on unknown unit '{}'",
                        unit.name, dep.unit
                    )));
                }
                if !seen_deps.insert(dep.unit.as_str()) {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' declares dependency '{}' twice",
                        unit.name, dep.unit
                    )));
                }
            }

            let mut seen_outputs = BTreeSet::new();
            for handle in &unit.produces {
                if !seen_outputs.insert(handle.as_str()) {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' publishes handle '{}' twice",
                        unit.name, handle
                    )));
                }
            }

            for req in &unit.requires {
                if unit.dependency(&req.unit).is_none() {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' requires {} without depending on '{}'",
                        unit.name, req, req.unit
                    )));
                }
                let producer = &self.units[self.index[&req.unit]];
                if !producer.produces.iter().any(|h| *h == req.handle) {
                    return Err(StackError::Catalog(format!(
                        "unit '{}' requires {}, which '{}' does not publish",
                        unit.name, req, req.unit
                    )));
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm over the whole table, ignoring enablement.
    fn check_acyclic(&self) -> StackResult<()> {
        let mut in_degree: Vec<usize> = self.units.iter().map(|u| u.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.units.len()];
        for (i, unit) in self.units.iter().enumerate() {
            for dep in &unit.depends_on {
                dependents[self.index[&dep.unit]].push(i);
            }
        }

        let mut ready: Vec<usize> = (0..self.units.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;
        while let Some(current) = ready.pop() {
            visited += 1;
            for &next in &dependents[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        if visited == self.units.len() {
            return Ok(());
        }
        let units = self
            .units
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, u)| u.name.clone())
            .collect();
        Err(StackError::CycleDetected { units })
    }
}

fn is_valid_unit_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Descriptors for the built-in categories, in declaration order.
///
/// Network, storage, and auth stand alone. The database and compute units
/// live inside the network boundary. Serverless functions read from the
/// bucket and join the network when one exists. Monitoring watches whatever
/// else is enabled.
pub fn standard_units() -> Vec<UnitDescriptor> {
    vec![
        UnitDescriptor::new("network", Category::Network).produces(&[
            "vpc",
            "security_group",
            "private_subnets",
        ]),
        UnitDescriptor::new("storage", Category::Storage).produces(&["bucket"]),
        UnitDescriptor::new("auth", Category::Auth).produces(&["user_pool", "user_pool_client"]),
        UnitDescriptor::new("database", Category::Database)
            .depends_on("network")
            .requires("network", &["vpc", "security_group", "private_subnets"])
            .produces(&["cluster", "endpoint", "secret"]),
        UnitDescriptor::new("compute", Category::Compute)
            .depends_on("network")
            .optionally_after("database")
            .optionally_after("storage")
            .requires("network", &["vpc", "security_group"])
            .requires("database", &["endpoint", "secret"])
            .requires("storage", &["bucket"])
            .produces(&["cluster", "service", "load_balancer"]),
        UnitDescriptor::new("serverless", Category::Serverless)
            .depends_on("storage")
            .optionally_after("network")
            .optionally_after("auth")
            .requires("storage", &["bucket"])
            .requires("network", &["vpc", "security_group"])
            .requires("auth", &["user_pool"])
            .produces(&["function", "api"]),
        UnitDescriptor::new("monitoring", Category::Monitoring)
            .optionally_after("database")
            .optionally_after("compute")
            .optionally_after("serverless")
            .requires("database", &["cluster"])
            .requires("compute", &["service", "load_balancer"])
            .requires("serverless", &["function"])
            .produces(&["log_group", "alarm_topic", "dashboard"]),
    ]
}
