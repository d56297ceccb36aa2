//! Network boundary: VPC, security group, private subnets.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Network(config) = request.config else {
        return Err(wrong_config(request, "network"));
    };

    let vpc = provision(request, "vpc", "vpc")
        .with_attribute("cidr", config.cidr.as_str())
        .with_attribute("max_azs", config.max_azs.to_string())
        .with_attribute("nat_gateways", config.nat_gateways.to_string());
    let security_group = provision(request, "security_group", "sg").with_attribute("vpc", vpc.id());
    let private_subnets = provision(request, "subnet_group", "private")
        .with_attribute("vpc", vpc.id())
        .with_attribute("count", config.max_azs.to_string());

    let mut handles = HandleMap::new();
    handles.insert("vpc".to_string(), vpc);
    handles.insert("security_group".to_string(), security_group);
    handles.insert("private_subnets".to_string(), private_subnets);
    Ok(handles)
}
