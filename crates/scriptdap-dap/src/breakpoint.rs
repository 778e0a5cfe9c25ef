//! Breakpoint registry shared by all connected clients.

use std::collections::HashMap;

use crate::protocol::{self, Checksum, Source};

/// A registered breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Protocol id, stable for this (path, line).
    pub id: i64,
    /// Source file path as sent by the client.
    pub path: String,
    /// Engine line number (1-based).
    pub line: i64,
    /// Whether the debugger accepted the breakpoint.
    pub verified: bool,
    /// Checksums of the source at registration time.
    pub checksums: Vec<Checksum>,
}

impl Breakpoint {
    /// Protocol descriptor, with `line` already converted for the client.
    pub fn to_protocol(&self, client_line: i64) -> protocol::Breakpoint {
        protocol::Breakpoint {
            id: Some(self.id),
            verified: self.verified,
            source: Some(Source::from_path(&self.path, self.checksums.clone())),
            line: Some(client_line),
        }
    }
}

/// Breakpoints keyed by source path.
///
/// Ids are handed out once per unique (path, line) and never reused until
/// [`BreakpointRegistry::clear`]. Individual breakpoints are never removed;
/// the set of lines a client last asked for is tracked separately so the
/// debugger can be told which ones to disable.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    breakpoints: HashMap<String, Vec<Breakpoint>>,
    active_lines: HashMap<String, Vec<i64>>,
    next_id: i64,
}

impl BreakpointRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the breakpoint at `path:line`.
    ///
    /// Known breakpoints keep their id; `checksums` is only used when a new
    /// entry is created.
    pub fn register(&mut self, path: &str, line: i64, checksums: Vec<Checksum>) -> &Breakpoint {
        let list = self.breakpoints.entry(path.to_string()).or_default();
        let index = match list.iter().position(|bp| bp.line == line) {
            Some(index) => index,
            None => {
                list.push(Breakpoint {
                    id: self.next_id,
                    path: path.to_string(),
                    line,
                    verified: true,
                    checksums,
                });
                self.next_id += 1;
                list.len() - 1
            }
        };
        &list[index]
    }

    /// Find the breakpoint at `path:line`.
    pub fn find(&self, path: &str, line: i64) -> Option<&Breakpoint> {
        self.breakpoints
            .get(path)
            .and_then(|list| list.iter().find(|bp| bp.line == line))
    }

    /// Record the lines now requested for `path`, returning the lines that
    /// were requested last time but not any more.
    pub fn replace_active_lines(&mut self, path: &str, lines: &[i64]) -> Vec<i64> {
        let previous = self
            .active_lines
            .insert(path.to_string(), lines.to_vec())
            .unwrap_or_default();
        previous
            .into_iter()
            .filter(|line| !lines.contains(line))
            .collect()
    }

    /// Number of registered breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every breakpoint and restart ids at 0.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.active_lines.clear();
        self.next_id = 0;
    }
}
