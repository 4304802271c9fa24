//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `listener.bind_address`.
pub const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";
/// Environment variable overriding `observability.service_name`.
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";
/// Environment variable overriding `observability.service_namespace`.
pub const ENV_SERVICE_NAMESPACE: &str = "SERVICE_NAMESPACE";
/// Environment variable overriding `observability.service_instance_id`.
pub const ENV_SERVICE_INSTANCE_ID: &str = "SERVICE_INSTANCE_ID";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the TOML file at `path` (or the defaults), apply environment
/// overrides and then `bind_override`, and validate the result.
///
/// `bind_override` comes from the command line and wins over both the file
/// and `BIND_ADDRESS`.
pub fn load_config(
    path: Option<&Path>,
    bind_override: Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServerConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    if let Some(address) = bind_override {
        config.listener.bind_address = address;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply overrides from `lookup`; empty values are ignored.
pub fn apply_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(address) = get(ENV_BIND_ADDRESS) {
        config.listener.bind_address = address;
    }
    if let Some(name) = get(ENV_SERVICE_NAME) {
        config.observability.service_name = name;
    }
    if let Some(namespace) = get(ENV_SERVICE_NAMESPACE) {
        config.observability.service_namespace = namespace;
    }
    if let Some(instance_id) = get(ENV_SERVICE_INSTANCE_ID) {
        config.observability.service_instance_id = Some(instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn overrides_replace_configured_values() {
        let mut config = ServerConfig::default();
        apply_overrides(
            &mut config,
            lookup(&[
                (ENV_BIND_ADDRESS, "127.0.0.1:7000"),
                (ENV_SERVICE_NAME, "checkout"),
                (ENV_SERVICE_NAMESPACE, "shop"),
                (ENV_SERVICE_INSTANCE_ID, "pod-7"),
            ]),
        );

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.observability.service_name, "checkout");
        assert_eq!(config.observability.service_namespace, "shop");
        assert_eq!(
            config.observability.service_instance_id.as_deref(),
            Some("pod-7")
        );
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut config = ServerConfig::default();
        apply_overrides(&mut config, lookup(&[(ENV_SERVICE_NAME, " ")]));
        assert_eq!(config.observability.service_name, "graceful-server");
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!(
            "graceful-server-bad-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[listener\nbind_address = 1").unwrap();

        let result = load_config(Some(&path), None);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/graceful-server.toml")), None);
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn bind_override_replaces_file_value() {
        let path = std::env::temp_dir().join(format!(
            "graceful-server-bind-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:7000\"\n").unwrap();

        let result = load_config(Some(&path), Some("localhost:9000".to_string()));
        let _ = fs::remove_file(&path);

        assert_eq!(result.unwrap().listener.bind_address, "localhost:9000");
    }

    #[test]
    fn invalid_bind_override_fails_validation() {
        let err = load_config(None, Some("no-port".to_string())).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert!(
                errors.contains(&ValidationError::BindAddress("no-port".into())),
                "{errors:?}"
            ),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn validation_error_lists_all_problems() {
        let err = ConfigError::Validation(vec![
            ValidationError::ZeroConnections,
            ValidationError::ZeroGracePeriod,
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: listener.max_connections must be greater than zero, \
             shutdown.grace_period_ms must be greater than zero"
        );
    }
}
