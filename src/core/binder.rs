//! SP-005: Resource binder: run-scoped, write-once store of produced handles.

use super::error::{StackError, StackResult};
use super::types::{HandleMap, HandleRef, ResourceHandle};
use indexmap::IndexMap;

/// Handles each unit has published so far, in recording order.
#[derive(Debug, Default)]
pub struct ResourceBinder {
    slots: IndexMap<String, HandleMap>,
}

impl ResourceBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a unit's handles. Each unit may record exactly once per run.
    pub fn record(&mut self, unit: &str, handles: HandleMap) -> StackResult<()> {
        if self.slots.contains_key(unit) {
            return Err(StackError::DuplicateUnit(unit.to_string()));
        }
        self.slots.insert(unit.to_string(), handles);
        Ok(())
    }

    /// Look up named handles of one unit. An empty request binds nothing.
    pub fn resolve(&self, unit: &str, names: &[&str]) -> StackResult<HandleMap> {
        let Some(first) = names.first() else {
            return Ok(HandleMap::new());
        };
        let slot = self.slot(unit, first)?;
        names
            .iter()
            .map(|name| {
                slot.get(*name)
                    .map(|h| (name.to_string(), h.clone()))
                    .ok_or_else(|| missing(unit, name))
            })
            .collect()
    }

    /// Look up handles across units, keyed by their address.
    pub fn resolve_refs(&self, refs: &[HandleRef]) -> StackResult<BoundInputs> {
        let mut handles = IndexMap::with_capacity(refs.len());
        for r in refs {
            let handle = self
                .slot(&r.unit, &r.handle)?
                .get(&r.handle)
                .ok_or_else(|| missing(&r.unit, &r.handle))?;
            handles.insert(r.clone(), handle.clone());
        }
        Ok(BoundInputs { handles })
    }

    pub fn is_recorded(&self, unit: &str) -> bool {
        self.slots.contains_key(unit)
    }

    /// Recorded unit names, in recording order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Final contents: unit → handle name → handle.
    pub fn into_contents(self) -> IndexMap<String, HandleMap> {
        self.slots
    }

    fn slot(&self, unit: &str, handle: &str) -> StackResult<&HandleMap> {
        self.slots.get(unit).ok_or_else(|| missing(unit, handle))
    }
}

fn missing(unit: &str, handle: &str) -> StackError {
    StackError::MissingHandle {
        unit: unit.to_string(),
        handle: handle.to_string(),
    }
}

/// Resolved inputs handed to a unit builder.
#[derive(Debug, Clone, Default)]
pub struct BoundInputs {
    handles: IndexMap<HandleRef, ResourceHandle>,
}

impl BoundInputs {
    pub fn get(&self, unit: &str, handle: &str) -> Option<&ResourceHandle> {
        self.handles.get(&HandleRef::new(unit, handle))
    }

    /// Like [`get`](Self::get), for builders that cannot proceed without it.
    pub fn require(&self, unit: &str, handle: &str) -> anyhow::Result<&ResourceHandle> {
        self.get(unit, handle)
            .ok_or_else(|| anyhow::anyhow!("input {}.{} was not bound", unit, handle))
    }

    /// Whether any handle of `unit` was bound.
    pub fn has_unit(&self, unit: &str) -> bool {
        self.handles.keys().any(|r| r.unit == unit)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HandleRef, &ResourceHandle)> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
