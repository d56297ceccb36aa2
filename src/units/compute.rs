//! Container service behind a load balancer.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Compute(config) = request.config else {
        return Err(wrong_config(request, "compute"));
    };
    let vpc = request.inputs.require("network", "vpc")?;
    let security_group = request.inputs.require("network", "security_group")?;

    let cluster = provision(request, "container_cluster", "cluster").with_attribute("vpc", vpc.id());
    let mut service = provision(request, "container_service", "service")
        .with_attribute("cluster", cluster.id())
        .with_attribute("image", config.image.as_str())
        .with_attribute("cpu", config.cpu.to_string())
        .with_attribute("memory_mib", config.memory_mib.to_string())
        .with_attribute("desired_count", config.desired_count.to_string())
        .with_attribute("security_group", security_group.id());

    // Optional wiring: present only when the dependency ran
    if let Some(endpoint) = request.inputs.get("database", "endpoint") {
        service = service.with_attribute("database_endpoint", endpoint.id());
    }
    if let Some(secret) = request.inputs.get("database", "secret") {
        service = service.with_attribute("database_secret", secret.id());
    }
    if let Some(bucket) = request.inputs.get("storage", "bucket") {
        service = service.with_attribute("bucket", bucket.id());
    }

    let load_balancer = provision(request, "load_balancer", "lb")
        .with_attribute("service", service.id())
        .with_attribute("port", config.port.to_string())
        .with_attribute(
            "dns_name",
            format!("{}.{}.elb.internal", request.stack.resource_name("lb"), request.stack.region),
        );

    let mut handles = HandleMap::new();
    handles.insert("cluster".to_string(), cluster);
    handles.insert("service".to_string(), service);
    handles.insert("load_balancer".to_string(), load_balancer);
    Ok(handles)
}
