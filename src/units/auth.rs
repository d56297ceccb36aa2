//! User directory and its application client.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap, MfaMode};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Auth(config) = request.config else {
        return Err(wrong_config(request, "auth"));
    };

    let mfa = match config.mfa {
        MfaMode::Off => "off",
        MfaMode::Optional => "optional",
        MfaMode::Required => "required",
    };
    let user_pool = provision(request, "user_pool", "users")
        .with_attribute("mfa", mfa)
        .with_attribute("self_sign_up", config.self_sign_up.to_string())
        .with_attribute("password_min_length", config.password_min_length.to_string());
    let client = provision(request, "user_pool_client", "users-client")
        .with_attribute("user_pool", user_pool.id());

    let mut handles = HandleMap::new();
    handles.insert("user_pool".to_string(), user_pool);
    handles.insert("user_pool_client".to_string(), client);
    Ok(handles)
}
