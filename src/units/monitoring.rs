//! Log group, alarm topic and dashboard over whatever else was built.

use super::{ensure_enabled, provision, wrong_config};
use crate::core::executor::BuildRequest;
use crate::core::types::{CategoryConfig, HandleMap};

pub fn build(request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
    ensure_enabled(request)?;
    let CategoryConfig::Monitoring(config) = request.config else {
        return Err(wrong_config(request, "monitoring"));
    };

    // Every bound input is something worth watching
    let watched: Vec<&str> = request.inputs.iter().map(|(_, handle)| handle.id()).collect();

    let log_group = provision(request, "log_group", "logs")
        .with_attribute("retention_days", config.log_retention_days.to_string());
    let mut alarm_topic = provision(request, "alarm_topic", "alarms")
        .with_attribute("alarms", watched.len().to_string());
    if let Some(email) = &config.alarm_email {
        alarm_topic = alarm_topic.with_attribute("subscription", email.as_str());
    }
    let dashboard = provision(request, "dashboard", "dashboard")
        .with_attribute("enabled", config.dashboard.to_string())
        .with_attribute("widgets", watched.join(","));

    let mut handles = HandleMap::new();
    handles.insert("log_group".to_string(), log_group);
    handles.insert("alarm_topic".to_string(), alarm_topic);
    handles.insert("dashboard".to_string(), dashboard);
    Ok(handles)
}
