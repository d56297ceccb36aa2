//! Function plus the HTTP API in front of it.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Serverless(config) = request.config else {
        return Err(wrong_config(request, "serverless"));
    };
    let bucket = request.inputs.require("storage", "bucket")?;

    let mut function = provision(request, "function", "fn")
        .with_attribute("runtime", config.runtime.as_str())
        .with_attribute("handler", config.handler.as_str())
        .with_attribute("memory_mb", config.memory_mb.to_string())
        .with_attribute("timeout_secs", config.timeout_secs.to_string())
        .with_attribute("bucket", bucket.id());
    if let (Some(vpc), Some(sg)) = (
        request.inputs.get("network", "vpc"),
        request.inputs.get("network", "security_group"),
    ) {
        function = function
            .with_attribute("vpc", vpc.id())
            .with_attribute("security_group", sg.id());
    }

    let mut api = provision(request, "http_api", "api").with_attribute("function", function.id());
    api = match request.inputs.get("auth", "user_pool") {
        Some(pool) => api.with_attribute("authorizer", pool.id()),
        None => api.with_attribute("authorizer", "none"),
    };

    let mut handles = HandleMap::new();
    handles.insert("function".to_string(), function);
    handles.insert("api".to_string(), api);
    Ok(handles)
}
