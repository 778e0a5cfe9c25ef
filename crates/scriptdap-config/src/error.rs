use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading, parsing,
/// or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the default config file.
    #[error("failed to create default config at {path}: {reason}")]
    CreateDefault {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `server.port`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// An I/O error occurred while reading config files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_default_display_contains_path_and_reason() {
        let err = ConfigError::CreateDefault {
            path: PathBuf::from("/etc/scriptdap/config.toml"),
            reason: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/scriptdap/config.toml"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn validation_display_contains_field_and_message() {
        let err = ConfigError::Validation {
            field: "server.port".into(),
            message: "must not be 0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("server.port"));
        assert!(msg.contains("must not be 0"));
        assert!(msg.contains("validation error"));
    }

    #[test]
    fn io_error_display_contains_inner() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = ConfigError::from(inner);
        assert!(err.to_string().contains("file missing"));
    }
}
