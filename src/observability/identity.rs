//! Service identity attached to exported metrics and greetings.

use std::fs;

use crate::config::ObservabilityConfig;

const SERVICE_COMPONENT: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub namespace: String,
    pub component: String,
    pub instance_id: String,
}

impl ServiceIdentity {
    /// Resolve the identity, falling back to the host name for the instance id.
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        let instance_id = config
            .service_instance_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(host_name);

        Self {
            name: config.service_name.clone(),
            namespace: config.service_namespace.clone(),
            component: SERVICE_COMPONENT.to_string(),
            instance_id,
        }
    }

    /// `(key, value)` pairs in resource-attribute form.
    pub fn labels(&self) -> [(&'static str, String); 4] {
        [
            ("service_name", self.name.clone()),
            ("service_namespace", self.namespace.clone()),
            ("service_component", self.component.clone()),
            ("service_instance_id", self.instance_id.clone()),
        ]
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_instance_id_wins() {
        let config = ObservabilityConfig {
            service_instance_id: Some("pod-3".into()),
            ..ObservabilityConfig::default()
        };
        let identity = ServiceIdentity::from_config(&config);
        assert_eq!(identity.instance_id, "pod-3");
        assert_eq!(identity.component, "main");
        assert_eq!(identity.labels()[3], ("service_instance_id", "pod-3".into()));
    }

    #[test]
    fn blank_instance_id_falls_back_to_host() {
        let config = ObservabilityConfig {
            service_instance_id: Some("".into()),
            ..ObservabilityConfig::default()
        };
        let identity = ServiceIdentity::from_config(&config);
        assert!(!identity.instance_id.is_empty());
    }
}
