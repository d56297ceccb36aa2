//! Object storage bucket.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Storage(config) = request.config else {
        return Err(wrong_config(request, "storage"));
    };

    let mut bucket = provision(request, "bucket", &config.bucket_prefix)
        .with_attribute("versioned", config.versioned.to_string());
    if config.expiration_days > 0 {
        bucket = bucket.with_attribute("expiration_days", config.expiration_days.to_string());
    }

    Ok(HandleMap::from([("bucket".to_string(), bucket)]))
}
