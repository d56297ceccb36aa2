//! SP-007: Run lock management: build, load, save (atomic), path derivation.

use super::catalog::Catalog;
use super::error::{StackError, StackResult};
use super::executor::RunOutcome;
use super::types::{RunLock, StackConfig, UnitLock};
use crate::tripwire::{eventlog, hasher};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Derive the lock file path for a stack within the state directory.
pub fn lock_file_path(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack).join("run.lock.yaml")
}

/// Load a stack's lock file. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stack: &str) -> StackResult<Option<RunLock>> {
    let path = lock_file_path(state_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| StackError::State(format!("cannot read {}: {}", path.display(), e)))?;
    let lock: RunLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| StackError::State(format!("invalid lock file {}: {}", path.display(), e)))?;
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &RunLock) -> StackResult<()> {
    let path = lock_file_path(state_dir, &lock.stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StackError::State(format!("cannot create dir {}: {}", parent.display(), e))
        })?;
    }

    let yaml = serde_yaml_ng::to_string(lock)
        .map_err(|e| StackError::State(format!("serialize error: {}", e)))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| StackError::State(format!("cannot write {}: {}", tmp_path.display(), e)))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        StackError::State(format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Record a completed run.
pub fn lock_from_outcome(
    config: &StackConfig,
    catalog: &Catalog,
    outcome: &RunOutcome,
    run_id: &str,
) -> RunLock {
    let mut units = IndexMap::new();
    for unit in &outcome.plan.order {
        let Some(descriptor) = catalog.get(unit) else {
            continue;
        };
        units.insert(
            unit.clone(),
            UnitLock {
                category: descriptor.category,
                hash: hasher::hash_unit(config, unit, descriptor.category),
                duration_seconds: outcome.durations.get(unit).copied(),
                handles: outcome.handles.get(unit).cloned().unwrap_or_default(),
            },
        );
    }

    RunLock {
        schema: "1.0".to_string(),
        stack: config.name.clone(),
        run_id: run_id.to_string(),
        generated_at: eventlog::now_iso8601(),
        generator: format!("stackplan {}", env!("CARGO_PKG_VERSION")),
        config_hash: outcome.config_hash.clone(),
        order: outcome.plan.order.clone(),
        edges: outcome.plan.edges.clone(),
        units,
    }
}
