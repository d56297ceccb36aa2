//! SP-010: Simulated unit builders.
//!
//! One builder per resource category. They provision nothing; each derives
//! stable identifiers from the stack name, environment, region and unit so a
//! run can be exercised end to end and produces the same handles every time.

pub mod auth;
pub mod compute;
pub mod database;
pub mod monitoring;
pub mod network;
pub mod serverless;
pub mod storage;

use crate::core::executor::{BuildRequest, BuilderRegistry};
use crate::core::types::ResourceHandle;
use crate::tripwire::hasher;

/// Registry wiring every unit of the standard catalog to its simulated builder.
pub fn simulated_registry() -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    registry
        .register_fn("network", network::build)
        .register_fn("storage", storage::build)
        .register_fn("auth", auth::build)
        .register_fn("database", database::build)
        .register_fn("compute", compute::build)
        .register_fn("serverless", serverless::build)
        .register_fn("monitoring", monitoring::build);
    registry
}

/// Deterministic handle of `kind`, named `{stack}-{env}-{suffix}`.
pub(crate) fn provision(request: &BuildRequest<'_>, kind: &str, suffix: &str) -> ResourceHandle {
    let stack = request.stack;
    let id = hasher::short_id(&[stack.name, stack.environment, stack.region, request.unit, kind]);
    ResourceHandle::new(kind, format!("{}-{}", kind.replace('_', "-"), id))
        .with_attribute("name", stack.resource_name(suffix))
        .with_attribute("region", stack.region)
}

/// Builders are only invoked for enabled units; anything else is a wiring bug.
pub(crate) fn ensure_enabled(request: &BuildRequest<'_>) -> anyhow::Result<()> {
    if !request.enabled {
        anyhow::bail!("unit '{}' invoked while disabled", request.unit);
    }
    Ok(())
}

pub(crate) fn wrong_config(request: &BuildRequest<'_>, expected: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "unit '{}' expects {} configuration, got {}",
        request.unit,
        expected,
        request.config.category()
    )
}
