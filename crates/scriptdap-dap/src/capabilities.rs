//! Capabilities on both sides of the `initialize` handshake.

use crate::protocol::{Capabilities, InitializeRequestArguments};

/// Checksum algorithms attached to every `Source` the adapter reports.
pub const CHECKSUM_ALGORITHMS: [&str; 2] = ["MD5", "SHA256"];

/// What a client announced in `initialize`, stored as plain booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCapabilities {
    /// Client lines are 1-based.
    pub lines_start_at1: bool,
    /// Client columns are 1-based.
    pub columns_start_at1: bool,
    /// The client renders the `type` field of variables.
    pub supports_variable_type: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            lines_start_at1: true,
            columns_start_at1: true,
            supports_variable_type: false,
        }
    }
}

impl ClientCapabilities {
    /// Resolve the optional fields of an `initialize` request.
    pub fn from_initialize_request(args: &InitializeRequestArguments) -> Self {
        Self {
            lines_start_at1: args.lines_start_at1.unwrap_or(true),
            columns_start_at1: args.columns_start_at1.unwrap_or(true),
            supports_variable_type: args.supports_variable_type.unwrap_or(false),
        }
    }

    /// Convert an engine (1-based) line to the client's numbering.
    pub fn line_to_client(&self, line: i64) -> i64 {
        if self.lines_start_at1 {
            line
        } else {
            line - 1
        }
    }

    /// Convert a client line to the engine's 1-based numbering.
    pub fn line_from_client(&self, line: i64) -> i64 {
        if self.lines_start_at1 {
            line
        } else {
            line + 1
        }
    }

    /// Convert an engine (1-based) column to the client's numbering.
    pub fn column_to_client(&self, column: i64) -> i64 {
        if self.columns_start_at1 {
            column
        } else {
            (column - 1).max(0)
        }
    }
}

/// Capabilities the adapter announces in its `initialize` response.
pub fn adapter_capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_evaluate_for_hovers: Some(false),
        supports_set_variable: Some(false),
        supports_terminate_request: Some(true),
        supports_restart_request: Some(true),
        supports_breakpoint_locations_request: Some(true),
        supported_checksum_algorithms: Some(
            CHECKSUM_ALGORITHMS.iter().map(|s| s.to_string()).collect(),
        ),
    }
}
