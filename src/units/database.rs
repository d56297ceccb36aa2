//! Relational database cluster inside the network boundary.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, DatabaseEngine, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Database(config) = request.config else {
        return Err(wrong_config(request, "database"));
    };
    let vpc = request.inputs.require("network", "vpc")?;
    let security_group = request.inputs.require("network", "security_group")?;
    let subnets = request.inputs.require("network", "private_subnets")?;

    let port = match config.engine {
        DatabaseEngine::Postgres => 5432,
        DatabaseEngine::Mysql => 3306,
    };
    let cluster = provision(request, "db_cluster", "db")
        .with_attribute("engine", config.engine.to_string())
        .with_attribute("instance_class", config.instance_class.as_str())
        .with_attribute("allocated_storage_gb", config.allocated_storage_gb.to_string())
        .with_attribute("multi_az", config.multi_az.to_string())
        .with_attribute("vpc", vpc.id())
        .with_attribute("security_group", security_group.id())
        .with_attribute("subnets", subnets.id());
    let endpoint = provision(request, "db_endpoint", "db")
        .with_attribute(
            "address",
            format!("{}.{}.db.internal", cluster.id(), request.stack.region),
        )
        .with_attribute("port", port.to_string())
        .with_attribute("database", config.database_name.as_str());
    let secret = provision(request, "secret", "db-credentials")
        .with_attribute("cluster", cluster.id());

    let mut handles = HandleMap::new();
    handles.insert("cluster".to_string(), cluster);
    handles.insert("endpoint".to_string(), endpoint);
    handles.insert("secret".to_string(), secret);
    Ok(handles)
}
