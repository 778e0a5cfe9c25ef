use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive understood by an `EnvFilter`.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Listener and connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port clients connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address the listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Simultaneous clients (1–64).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Largest header or body accepted from a client, in bytes.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Delay between two server polls (1–1000 ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_port() -> u16 {
    6006
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_max_clients() -> usize {
    8
}
fn default_max_buffer_size() -> usize {
    4 * 1024 * 1024
}
fn default_poll_interval_ms() -> u64 {
    50
}

impl ServerConfig {
    /// The bind address, if it is a valid IP address.
    pub fn bind_ip(&self) -> Option<IpAddr> {
        self.bind_address.trim().parse().ok()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            max_clients: default_max_clients(),
            max_buffer_size: default_max_buffer_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// The project being debugged.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory `res://` paths resolve against. Defaults to the
    /// working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Top-level scriptdap configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Project settings.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}
