//! SP-002: Configuration loading and validation.
//!
//! Parses `stack.yaml` (or `stack.toml`), applies enablement overrides from
//! the environment, and validates structural constraints:
//! - Version must be "1.0"
//! - Stack name must be a lowercase DNS label
//! - Category parameters must be within their documented ranges

use super::error::{StackError, StackResult};
use super::types::*;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::debug;

/// Prefix of enablement override variables: `STACKPLAN_<CATEGORY>_ENABLED`.
pub const ENV_PREFIX: &str = "STACKPLAN_";

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a configuration file from disk. `.toml` files are read as TOML,
/// everything else as YAML.
pub fn parse_config_file(path: &Path) -> StackResult<StackConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StackError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_config_toml(&content),
        _ => parse_config(&content),
    }
}

/// Parse a YAML configuration from a string.
pub fn parse_config(yaml: &str) -> StackResult<StackConfig> {
    serde_yaml_ng::from_str(yaml)
        .map_err(|e| StackError::Configuration(format!("YAML parse error: {}", e)))
}

/// Parse a TOML configuration from a string.
pub fn parse_config_toml(source: &str) -> StackResult<StackConfig> {
    toml::from_str(source)
        .map_err(|e| StackError::Configuration(format!("TOML parse error: {}", e)))
}

/// Apply `STACKPLAN_<CATEGORY>_ENABLED` overrides. Returns the categories
/// that were overridden. Unrelated variables are ignored; a recognised
/// variable with an unparseable value is an error.
pub fn apply_env_overrides<I>(config: &mut StackConfig, vars: I) -> StackResult<Vec<Category>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut applied = Vec::new();
    for (key, value) in vars {
        let Some(category) = key
            .strip_prefix(ENV_PREFIX)
            .and_then(|rest| rest.strip_suffix("_ENABLED"))
            .and_then(|name| Category::from_name(&name.to_ascii_lowercase()))
        else {
            continue;
        };
        let enabled = parse_flag(&value).ok_or_else(|| {
            StackError::Configuration(format!("{}: expected a boolean, got '{}'", key, value))
        })?;
        debug!(%category, enabled, "enablement override from environment");
        config.set_enabled(category, enabled);
        applied.push(category);
    }
    Ok(applied)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, message: String| {
        if !ok {
            errors.push(ValidationError { message });
        }
    };

    check(
        config.version == "1.0",
        format!("version must be \"1.0\", got \"{}\"", config.version),
    );
    check(
        is_dns_label(&config.name, 48),
        format!(
            "name must be 1-48 lowercase letters, digits or '-', got \"{}\"",
            config.name
        ),
    );
    check(
        is_dns_label(&config.environment, 16),
        format!("environment \"{}\" is not a valid label", config.environment),
    );
    check(!config.region.is_empty(), "region must not be empty".to_string());

    // network
    let net = &config.network;
    match parse_cidr(&net.cidr) {
        Some((_, prefix)) => check(
            (16..=28).contains(&prefix),
            format!("network.cidr prefix must be /16 to /28, got /{}", prefix),
        ),
        None => check(false, format!("network.cidr \"{}\" is not a CIDR block", net.cidr)),
    }
    check(
        (1..=6).contains(&net.max_azs),
        format!("network.max_azs must be 1-6, got {}", net.max_azs),
    );
    check(
        net.nat_gateways <= net.max_azs,
        format!(
            "network.nat_gateways ({}) exceeds max_azs ({})",
            net.nat_gateways, net.max_azs
        ),
    );

    // storage
    check(
        is_dns_label(&config.storage.bucket_prefix, 20),
        format!(
            "storage.bucket_prefix \"{}\" is not a valid label",
            config.storage.bucket_prefix
        ),
    );

    // database
    let db = &config.database;
    check(
        (20..=65536).contains(&db.allocated_storage_gb),
        format!(
            "database.allocated_storage_gb must be 20-65536, got {}",
            db.allocated_storage_gb
        ),
    );
    check(
        !db.database_name.is_empty()
            && db
                .database_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        format!("database.database_name \"{}\" is invalid", db.database_name),
    );
    check(
        !db.instance_class.is_empty(),
        "database.instance_class must not be empty".to_string(),
    );

    // auth
    check(
        (6..=99).contains(&config.auth.password_min_length),
        format!(
            "auth.password_min_length must be 6-99, got {}",
            config.auth.password_min_length
        ),
    );

    // compute
    let compute = &config.compute;
    check(
        [256, 512, 1024, 2048, 4096].contains(&compute.cpu),
        format!("compute.cpu must be one of 256/512/1024/2048/4096, got {}", compute.cpu),
    );
    check(
        u64::from(compute.memory_mib) >= u64::from(compute.cpu) * 2,
        format!(
            "compute.memory_mib ({}) must be at least twice compute.cpu ({})",
            compute.memory_mib, compute.cpu
        ),
    );
    check(compute.port != 0, "compute.port must not be 0".to_string());
    check(!compute.image.is_empty(), "compute.image must not be empty".to_string());

    // serverless
    let fun = &config.serverless;
    check(
        (128..=10240).contains(&fun.memory_mb),
        format!("serverless.memory_mb must be 128-10240, got {}", fun.memory_mb),
    );
    check(
        (1..=900).contains(&fun.timeout_secs),
        format!("serverless.timeout_secs must be 1-900, got {}", fun.timeout_secs),
    );
    check(
        !fun.handler.is_empty() && !fun.runtime.is_empty(),
        "serverless.runtime and serverless.handler must not be empty".to_string(),
    );

    // monitoring
    let mon = &config.monitoring;
    check(
        mon.log_retention_days > 0,
        "monitoring.log_retention_days must be positive".to_string(),
    );
    if let Some(email) = &mon.alarm_email {
        check(
            email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
            format!("monitoring.alarm_email \"{}\" is not an address", email),
        );
    }

    errors
}

/// Parse, apply environment overrides, and validate. The returned config is
/// fully defaulted and safe to hand to the orchestrator.
pub fn load_config<I>(path: &Path, vars: I) -> StackResult<StackConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = parse_config_file(path)?;
    apply_env_overrides(&mut config, vars)?;
    let errors = validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    let joined = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(StackError::Configuration(joined))
}

fn is_dns_label(s: &str, max_len: usize) -> bool {
    !s.is_empty()
        && s.len() <= max_len
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn parse_cidr(cidr: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    (prefix <= 32).then_some((addr, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sp002_parse_valid() {
        let yaml = r#"
version: "1.0"
name: shop
network:
  enabled: true
database:
  enabled: true
"#;
        let config = parse_config(yaml).unwrap();
        assert!(validate_config(&config).is_empty());
        assert!(config.database.enabled);
    }

    #[test]
    fn test_sp002_parse_invalid_yaml() {
        let result = parse_config("not: [valid: yaml: {{");
        assert!(result.unwrap_err().to_string().contains("YAML parse error"));
    }

    #[test]
    fn test_sp002_missing_name() {
        let result = parse_config("version: \"1.0\"\n");
        assert!(matches!(result, Err(StackError::Configuration(_))));
    }

    #[test]
    fn test_sp002_parse_toml() {
        let source = r#"
version = "1.0"
name = "shop"

[storage]
enabled = true
versioned = false
"#;
        let config = parse_config_toml(source).unwrap();
        assert!(config.storage.enabled);
        assert!(!config.storage.versioned);
        assert!(config.monitoring.enabled);
    }

    #[test]
    fn test_sp002_bad_version() {
        let mut config = StackConfig::named("shop");
        config.version = "2.0".to_string();
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("version"));
    }

    #[test]
    fn test_sp002_bad_name() {
        for name in ["", "Shop", "-shop", "shop_1"] {
            let config = StackConfig::named(name);
            assert!(!validate_config(&config).is_empty(), "{name:?}");
        }
    }

    #[test]
    fn test_sp002_bad_cidr() {
        let mut config = StackConfig::named("shop");
        config.network.cidr = "10.0.0.0".to_string();
        assert!(validate_config(&config)[0].message.contains("not a CIDR"));
        config.network.cidr = "10.0.0.0/8".to_string();
        assert!(validate_config(&config)[0].message.contains("/16 to /28"));
    }

    #[test]
    fn test_sp002_nat_exceeds_azs() {
        let mut config = StackConfig::named("shop");
        config.network.nat_gateways = 3;
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("nat_gateways")));
    }

    #[test]
    fn test_sp002_compute_memory_ratio() {
        let mut config = StackConfig::named("shop");
        config.compute.cpu = 1024;
        config.compute.memory_mib = 1024;
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("twice")));
    }

    #[test]
    fn test_sp002_huge_cpu_reports_errors() {
        let yaml = "version: \"1.0\"\nname: shop\ncompute:\n  enabled: true\n  cpu: 4000000000\n";
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("compute.cpu must be one of")));
        assert!(errors.iter().any(|e| e.message.contains("twice")));
    }

    #[test]
    fn test_sp002_bad_alarm_email() {
        let mut config = StackConfig::named("shop");
        config.monitoring.alarm_email = Some("ops".to_string());
        assert_eq!(validate_config(&config).len(), 1);
        config.monitoring.alarm_email = Some("ops@example.com".to_string());
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_sp002_defaults_are_valid() {
        assert!(validate_config(&StackConfig::named("shop")).is_empty());
    }

    #[test]
    fn test_sp002_env_overrides() {
        let mut config = StackConfig::named("shop");
        let applied = apply_env_overrides(
            &mut config,
            vars(&[
                ("STACKPLAN_NETWORK_ENABLED", "true"),
                ("STACKPLAN_MONITORING_ENABLED", "0"),
                ("STACKPLAN_QUEUE_ENABLED", "1"),
                ("PATH", "/usr/bin"),
            ]),
        )
        .unwrap();
        assert_eq!(applied, vec![Category::Network, Category::Monitoring]);
        assert!(config.network.enabled);
        assert!(!config.monitoring.enabled);
    }

    #[test]
    fn test_sp002_env_override_bad_value() {
        let mut config = StackConfig::named("shop");
        let err = apply_env_overrides(&mut config, vars(&[("STACKPLAN_AUTH_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("expected a boolean"));
    }

    #[test]
    fn test_sp002_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, "version: \"1.0\"\nname: shop\n").unwrap();
        let config = load_config(&path, vars(&[("STACKPLAN_STORAGE_ENABLED", "yes")])).unwrap();
        assert!(config.storage.enabled);
    }

    #[test]
    fn test_sp002_load_config_reports_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\nname: Shop\nauth:\n  password_min_length: 2\n",
        )
        .unwrap();
        let err = load_config(&path, Vec::new()).unwrap_err().to_string();
        assert!(err.contains("name must be"));
        assert!(err.contains("password_min_length"));
    }

    #[test]
    fn test_sp002_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/stack.yaml"), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
