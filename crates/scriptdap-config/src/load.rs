use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory holding the per-project overlay.
const PROJECT_DIR: &str = ".scriptdap";
const CONFIG_FILE: &str = "config.toml";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# scriptdap configuration
# Uncomment and edit settings below to override defaults.

# [server]
# port = 6006
# bind_address = "127.0.0.1"
# max_clients = 8
# max_buffer_size = 4194304
# poll_interval_ms = 50

# [project]
# root = "/path/to/project"

# [log]
# level = "info"
# file = "/path/to/scriptdap.log"
"#;

/// Load and merge configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults when missing.
/// 2. Looks for `.scriptdap/config.toml` from `project_dir` upward.
/// 3. Merges `Config::default() <- global <- project`.
/// 4. Validates the result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or the first
/// validation failure (all of them are logged).
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join(CONFIG_FILE);
    if !global_path.exists() {
        write_default(&global_path)?;
    }

    let mut config = Config::default();
    let global = std::fs::read_to_string(&global_path)?;
    if has_settings(&global) {
        config = merge_configs(&config, &global)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %project_path.display(), "applying project config");
        let overlay = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &overlay)?;
    }

    check(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            for e in &errors {
                tracing::warn!("invalid config: {e}");
            }
            Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ConfigError::Validation {
                    field: "unknown".to_string(),
                    message: "validation failed".to_string(),
                }))
        }
    }
}

fn write_default(path: &Path) -> Result<(), ConfigError> {
    let create = |reason: std::io::Error| ConfigError::CreateDefault {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(create)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_CONTENT).map_err(create)?;
    tracing::info!("Created default config at {}", path.display());
    Ok(())
}

/// Walk from `start` upward looking for `.scriptdap/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Whether the content has a line that is neither blank nor a comment.
fn has_settings(content: &str) -> bool {
    content.lines().map(str::trim).any(|l| !l.is_empty() && !l.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_config_creates_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        assert!(cfg_dir.join("config.toml").exists());
    }

    #[test]
    fn load_config_reads_existing_global() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[server]\nport = 7000\n").unwrap();

        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.max_clients, 8);
    }

    #[test]
    fn load_config_merges_project_over_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[server]\nport = 7000\nmax_clients = 4\n",
        )
        .unwrap();

        let project = tmp.path().join("game");
        std::fs::create_dir_all(project.join(".scriptdap")).unwrap();
        std::fs::write(
            project.join(".scriptdap").join("config.toml"),
            "[server]\nport = 7001\n",
        )
        .unwrap();

        let config = load_config(&cfg_dir, Some(&project)).unwrap();
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.server.max_clients, 4);
    }

    #[test]
    fn load_config_rejects_invalid_global() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[server]\nport = 0\n").unwrap();
        let err = load_config(tmp.path(), None).unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn load_from_str_parses_valid_toml() {
        let config = load_from_str("[log]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(config.log.level, crate::config::LogLevel::Warn);
    }

    #[test]
    fn load_from_str_rejects_bad_input() {
        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            load_from_str("[server]\npoll_interval_ms = 0\n"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn find_project_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        std::fs::create_dir_all(root.join(".scriptdap")).unwrap();
        std::fs::write(root.join(".scriptdap").join("config.toml"), "").unwrap();
        let deep = root.join("scenes").join("levels");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_project_config(&deep).expect("project config");
        assert!(found.ends_with(".scriptdap/config.toml"));
    }

    #[test]
    fn default_template_has_no_settings() {
        assert!(!has_settings(DEFAULT_CONFIG_CONTENT));
        assert!(has_settings("# comment\nport = 4\n"));
        assert_eq!(load_from_str(DEFAULT_CONFIG_CONTENT).unwrap(), Config::default());
    }
}
