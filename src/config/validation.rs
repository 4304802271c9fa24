//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and intervals > 0, addresses are host:port)
//!
//! Name resolution is left to the listener at startup.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not of the form host:port")]
    BindAddress(String),
    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,
    #[error("shutdown.grace_period_ms must be greater than zero")]
    ZeroGracePeriod,
    #[error("observability.sample_interval_ms must be greater than zero")]
    ZeroSampleInterval,
    #[error("observability.service_name must not be empty")]
    EmptyServiceName,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.shutdown.grace_period_ms == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    }
    if config.observability.sample_interval_ms == 0 {
        errors.push(ValidationError::ZeroSampleInterval);
    }
    if config.observability.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port; the host may be empty (all interfaces).
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.chars().any(char::is_whitespace) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn zero_settle_interval_is_allowed() {
        let mut config = ServerConfig::default();
        config.shutdown.settle_interval_ms = 0;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn host_names_and_empty_hosts_are_accepted() {
        for address in ["localhost:8080", ":8080", "[::1]:8080", "0.0.0.0:0"] {
            let mut config = ServerConfig::default();
            config.listener.bind_address = address.into();
            assert_eq!(validate_config(&config), Ok(()), "{address}");
        }
    }

    #[test]
    fn bind_address_needs_a_numeric_port() {
        for address in ["localhost", "localhost:http", "host:70000", ""] {
            let mut config = ServerConfig::default();
            config.listener.bind_address = address.into();
            assert_eq!(
                validate_config(&config),
                Err(vec![ValidationError::BindAddress(address.into())]),
                "{address}"
            );
        }
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "localhost".into();
        config.listener.max_connections = 0;
        config.shutdown.grace_period_ms = 0;
        config.observability.service_name = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("localhost".into()),
                ValidationError::ZeroConnections,
                ValidationError::ZeroGracePeriod,
                ValidationError::EmptyServiceName,
            ]
        );
    }
}
