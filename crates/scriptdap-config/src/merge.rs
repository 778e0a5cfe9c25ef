use toml::{Table, Value};

use crate::config::Config;
use crate::error::ConfigError;

fn parse_error(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Parse(e.to_string())
}

/// Apply a TOML overlay on top of `base`.
///
/// Keys present in `overlay_toml` win; nested tables are merged key by
/// key so an overlay can change a single setting of a section.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = match Value::try_from(base).map_err(parse_error)? {
        Value::Table(table) => table,
        other => return Err(parse_error(format!("config is not a table: {other}"))),
    };
    let overlay: Table = toml::from_str(overlay_toml).map_err(parse_error)?;
    deep_merge(&mut merged, overlay);
    Value::Table(merged).try_into().map_err(parse_error)
}

fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(inner)), Value::Table(patch)) => deep_merge(inner, patch),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        let merged = merge_configs(&base, "").expect("merge empty");
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_overrides_single_server_value() {
        let base = Config::default();
        let merged = merge_configs(&base, "[server]\nport = 6010\n").expect("merge");
        assert_eq!(merged.server.port, 6010);
        assert_eq!(merged.server.bind_address, "127.0.0.1");
        assert_eq!(merged.server.max_clients, 8);
    }

    #[test]
    fn merge_adds_missing_optional_field() {
        let base = Config::default();
        let merged = merge_configs(&base, "[project]\nroot = \"/work/game\"\n").expect("merge");
        assert_eq!(merged.project.root, Some(PathBuf::from("/work/game")));
        assert_eq!(merged.log, base.log);
    }

    #[test]
    fn merge_stacks_overlays() {
        let first = merge_configs(&Config::default(), "[log]\nlevel = \"debug\"\n").unwrap();
        let second = merge_configs(&first, "[server]\nmax_clients = 2\n").unwrap();
        assert_eq!(second.log.level, crate::config::LogLevel::Debug);
        assert_eq!(second.server.max_clients, 2);
    }

    #[test]
    fn merge_invalid_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_wrong_type_returns_parse_error() {
        let result = merge_configs(&Config::default(), "[server]\nport = \"high\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
