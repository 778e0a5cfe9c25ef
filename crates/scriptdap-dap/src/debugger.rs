//! Collaborator seams: the script debugger, the editor GUI, and project paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::protocol::{Checksum, LaunchRequestArguments};

/// One frame of a debugger stack dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInfo {
    /// Debugger-local path (e.g. `res://player.gd`).
    pub file: String,
    /// Function name.
    pub function: String,
    /// 1-based line.
    pub line: i64,
}

/// One variable streamed by the debugger for the current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackVariable {
    /// Variable name.
    pub name: String,
    /// Debugger-native value.
    #[serde(default)]
    pub value: serde_json::Value,
    /// 0 = local, 1 = member, 2 = global.
    pub scope: i64,
    /// Declared type; derived from `value` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl StackVariable {
    /// Render the value the way the debugger would print it.
    pub fn display_value(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    /// Declared type, or a type name guessed from the JSON value.
    pub fn resolved_type(&self) -> String {
        if let Some(name) = &self.type_name {
            return name.clone();
        }
        match &self.value {
            serde_json::Value::Null => "Nil",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(n) if n.is_f64() => "float",
            serde_json::Value::Number(_) => "int",
            serde_json::Value::String(_) => "String",
            serde_json::Value::Array(_) => "Array",
            serde_json::Value::Object(_) => "Dictionary",
        }
        .to_string()
    }
}

/// Signals raised by the script debugger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DebuggerSignal {
    /// The pause state was toggled.
    Paused,
    /// The debugged process ended.
    Stopped,
    /// The debuggee printed something.
    Output {
        /// Raw text.
        text: String,
    },
    /// Execution broke (or the break was cancelled).
    Breaked {
        /// False when the debugger resumed instead.
        really_did: bool,
        /// Whether inspection is possible at this point.
        can_debug: bool,
        /// "Breakpoint" or an error description.
        reason: String,
        /// A stack dump will follow.
        has_stackdump: bool,
    },
    /// Full call stack, innermost frame first.
    StackDump {
        /// Frames of the dump.
        frames: Vec<StackInfo>,
    },
    /// Number of variables about to be streamed for the current frame.
    StackFrameVars {
        /// Variable count.
        count: usize,
    },
    /// One variable of the current frame.
    StackFrameVar(StackVariable),
}

/// Error returned by debugger control operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebuggerError {
    /// Nothing is running to attach to or control.
    #[error("no debug session is running")]
    NotRunning,
    /// The requested platform cannot run the project.
    #[error("unknown platform")]
    UnknownPlatform,
    /// No device matches the requested index.
    #[error("missing device")]
    MissingDevice,
    /// The runtime refused for another reason.
    #[error("{0}")]
    Failed(String),
}

/// Control surface of the script debugger.
///
/// Request handlers drive the debugger through this trait; the debugger
/// reports back through [`DebuggerSignal`]s. Signals raised synchronously
/// while a request is handled are returned from [`Debugger::take_signals`]
/// and processed with that request's context.
pub trait Debugger {
    /// Whether the user paused execution.
    fn is_paused(&self) -> bool;
    /// Whether a debug session is running.
    fn is_session_active(&self) -> bool;
    /// Start the project.
    fn launch(&mut self, args: &LaunchRequestArguments) -> Result<(), DebuggerError>;
    /// Stop the running project.
    fn stop(&mut self);
    /// Break into the debugger.
    fn request_break(&mut self);
    /// Resume execution.
    fn request_continue(&mut self);
    /// Step over.
    fn request_next(&mut self);
    /// Step into.
    fn request_step(&mut self);
    /// Enable or disable a breakpoint at a debugger-local path.
    fn set_breakpoint(&mut self, path: &str, line: i64, enabled: bool);
    /// Ask for the variables of a frame.
    fn request_stack_frame_vars(&mut self, frame: i64);
    /// Signals raised since the last call.
    fn take_signals(&mut self) -> Vec<DebuggerSignal> {
        Vec::new()
    }
}

/// Editor notifications.
pub trait EditorHooks {
    /// Whether the debugger window may steal focus when execution breaks.
    fn set_move_to_foreground(&mut self, enabled: bool);
    /// Append a line to the editor log.
    fn log_message(&mut self, message: &str);
}

/// Editor hooks that only write to the tracing log.
#[derive(Debug, Default)]
pub struct TracingEditor {
    move_to_foreground: bool,
}

impl TracingEditor {
    /// Current auto-focus setting.
    pub fn move_to_foreground(&self) -> bool {
        self.move_to_foreground
    }
}

impl EditorHooks for TracingEditor {
    fn set_move_to_foreground(&mut self, enabled: bool) {
        self.move_to_foreground = enabled;
        tracing::debug!(enabled, "debugger auto-focus changed");
    }

    fn log_message(&mut self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Project-relative path handling and source checksums.
pub trait ProjectPaths {
    /// Convert a debugger-local path (`res://…`) to an absolute path.
    fn globalize(&self, path: &str) -> String;
    /// Convert an absolute path back to a debugger-local path.
    fn localize(&self, path: &str) -> String;
    /// Absolute project root.
    fn project_root(&self) -> String;
    /// Whether a client path points inside the project.
    fn is_in_project(&self, path: &str) -> bool;
    /// Checksums of a source file; empty when it cannot be read.
    fn checksums(&self, path: &str) -> Vec<Checksum>;
}

const RESOURCE_PREFIX: &str = "res://";

/// [`ProjectPaths`] backed by a project directory on disk.
#[derive(Debug, Clone)]
pub struct FsProjectPaths {
    root: PathBuf,
}

impl FsProjectPaths {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn root_str(&self) -> String {
        normalize_path(&self.root.to_string_lossy())
            .trim_end_matches('/')
            .to_string()
    }
}

impl ProjectPaths for FsProjectPaths {
    fn globalize(&self, path: &str) -> String {
        match path.strip_prefix(RESOURCE_PREFIX) {
            Some(rest) => format!("{}/{}", self.root_str(), rest),
            None => path.to_string(),
        }
    }

    fn localize(&self, path: &str) -> String {
        let root = self.root_str();
        let path = normalize_path(path);
        match path.strip_prefix(&root) {
            Some(rest) if rest.starts_with('/') => {
                format!("{RESOURCE_PREFIX}{}", rest.trim_start_matches('/'))
            }
            _ => path,
        }
    }

    fn project_root(&self) -> String {
        self.root_str()
    }

    fn is_in_project(&self, path: &str) -> bool {
        let (path, root) = if cfg!(windows) {
            (normalize_path(path).to_lowercase(), self.root_str().to_lowercase())
        } else {
            (normalize_path(path), self.root_str())
        };
        match path.strip_prefix(&root) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn checksums(&self, path: &str) -> Vec<Checksum> {
        match std::fs::read(Path::new(&self.globalize(path))) {
            Ok(content) => compute_checksums(&content),
            Err(e) => {
                tracing::debug!(path, error = %e, "cannot checksum source");
                Vec::new()
            }
        }
    }
}

/// MD5 and SHA256 digests of `content`, in that order.
pub fn compute_checksums(content: &[u8]) -> Vec<Checksum> {
    let md5 = md5::compute(content);
    let sha256 = Sha256::digest(content);
    vec![
        Checksum {
            algorithm: "MD5".into(),
            checksum: hex::encode(md5.0),
        },
        Checksum {
            algorithm: "SHA256".into(),
            checksum: hex::encode(sha256),
        },
    ]
}

/// Turn `c:\proj\a.gd` into `C:/proj/a.gd`; other paths are returned unchanged.
pub fn normalize_path(path: &str) -> String {
    if !path.contains('\\') {
        return path.to_string();
    }
    let mut out = path.replace('\\', "/");
    let bytes = out.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_lowercase() {
        let drive = (bytes[0] as char).to_ascii_uppercase();
        out.replace_range(..1, &drive.to_string());
    }
    out
}
