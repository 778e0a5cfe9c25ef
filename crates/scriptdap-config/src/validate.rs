use crate::config::Config;
use crate::error::ConfigError;

const MAX_CLIENTS_LIMIT: usize = 64;
const MIN_BUFFER_SIZE: usize = 1024;
const MAX_POLL_INTERVAL_MS: u64 = 1000;

fn violation(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let server = &config.server;
    let mut errors = Vec::new();

    if server.port == 0 {
        errors.push(violation("server.port", "must not be 0".to_string()));
    }

    if server.bind_ip().is_none() {
        errors.push(violation(
            "server.bind_address",
            format!("not an IP address: {:?}", server.bind_address),
        ));
    }

    if server.max_clients == 0 || server.max_clients > MAX_CLIENTS_LIMIT {
        errors.push(violation(
            "server.max_clients",
            format!("must be 1-{MAX_CLIENTS_LIMIT}, got {}", server.max_clients),
        ));
    }

    if server.max_buffer_size < MIN_BUFFER_SIZE {
        errors.push(violation(
            "server.max_buffer_size",
            format!(
                "must be at least {MIN_BUFFER_SIZE}, got {}",
                server.max_buffer_size
            ),
        ));
    }

    if server.poll_interval_ms == 0 || server.poll_interval_ms > MAX_POLL_INTERVAL_MS {
        errors.push(violation(
            "server.poll_interval_ms",
            format!(
                "must be 1-{MAX_POLL_INTERVAL_MS}, got {}",
                server.poll_interval_ms
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
