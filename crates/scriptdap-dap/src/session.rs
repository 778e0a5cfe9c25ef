//! Per-server debug session bookkeeping.
//!
//! Holds everything that protocol ids refer to: breakpoints, the current
//! stack-frame table, and the variables collected for each scope. Request
//! handlers read it, debugger signals mutate it.

use std::collections::HashMap;

use crate::breakpoint::{Breakpoint, BreakpointRegistry};
use crate::debugger::StackVariable;
use crate::error::DapError;
use crate::protocol::{Checksum, Source, StackFrame, Variable};

/// The three variable groups every frame exposes, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Function locals.
    Locals,
    /// Members of `self`.
    Members,
    /// Globals.
    Globals,
}

impl ScopeKind {
    /// All scopes in the order their ids are assigned.
    pub const ALL: [ScopeKind; 3] = [ScopeKind::Locals, ScopeKind::Members, ScopeKind::Globals];

    /// Map the debugger's variable discriminant (0, 1, 2) to a scope.
    pub fn from_discriminant(value: i64) -> Option<Self> {
        match value {
            0 => Some(ScopeKind::Locals),
            1 => Some(ScopeKind::Members),
            2 => Some(ScopeKind::Globals),
            _ => None,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            ScopeKind::Locals => "Locals",
            ScopeKind::Members => "Members",
            ScopeKind::Globals => "Globals",
        }
    }

    /// DAP presentation hint.
    pub fn presentation_hint(self) -> &'static str {
        match self {
            ScopeKind::Locals => "locals",
            ScopeKind::Members => "members",
            ScopeKind::Globals => "globals",
        }
    }

    fn index(self) -> usize {
        match self {
            ScopeKind::Locals => 0,
            ScopeKind::Members => 1,
            ScopeKind::Globals => 2,
        }
    }
}

/// Location of one frame before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLocation {
    /// Function name.
    pub function: String,
    /// Resolved source (global path + checksums).
    pub source: Source,
    /// Engine line.
    pub line: i64,
}

/// A stack frame and its scope ids.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntry {
    /// Frame with engine line/column numbering.
    pub frame: StackFrame,
    /// Variable references for Locals, Members, Globals.
    pub scopes: [i64; 3],
}

impl FrameEntry {
    /// The variable reference of one scope.
    pub fn scope_id(&self, kind: ScopeKind) -> i64 {
        self.scopes[kind.index()]
    }
}

/// Session state shared by request handlers and debugger callbacks.
#[derive(Debug)]
pub struct SessionState {
    breakpoints: BreakpointRegistry,
    frames: Vec<FrameEntry>,
    variables: HashMap<i64, Vec<Variable>>,
    next_frame_id: i64,
    next_variable_id: i64,
    current_frame: Option<i64>,
    remaining_vars: usize,
    /// A step request is in flight; the next break is reported as a step.
    pub stepping: bool,
    /// A breakpoint was hit and the stack dump will tell which one.
    pub processing_breakpoint: bool,
    /// A stack dump is on its way; stack traces must wait for it.
    pub processing_stackdump: bool,
}

impl SessionState {
    /// Create empty state with fresh counters.
    pub fn new() -> Self {
        Self {
            breakpoints: BreakpointRegistry::new(),
            frames: Vec::new(),
            variables: HashMap::new(),
            next_frame_id: 0,
            next_variable_id: 1,
            current_frame: None,
            remaining_vars: 0,
            stepping: false,
            processing_breakpoint: false,
            processing_stackdump: false,
        }
    }

    /// Register `lines` of `path`, reusing ids of known breakpoints.
    pub fn update_breakpoints(
        &mut self,
        path: &str,
        lines: &[i64],
        checksums: Vec<Checksum>,
    ) -> Vec<Breakpoint> {
        lines
            .iter()
            .map(|&line| {
                self.breakpoints
                    .register(path, line, checksums.clone())
                    .clone()
            })
            .collect()
    }

    /// Find the breakpoint at `path:line`.
    pub fn find_breakpoint(&self, path: &str, line: i64) -> Option<&Breakpoint> {
        self.breakpoints.find(path, line)
    }

    /// The breakpoint registry.
    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    /// Mutable access to the breakpoint registry.
    pub fn breakpoints_mut(&mut self) -> &mut BreakpointRegistry {
        &mut self.breakpoints
    }

    /// Replace the frame table with `frames`, innermost first.
    ///
    /// Frame ids restart at 0; each frame gets three fresh scope ids from
    /// the variable counter. The current frame becomes the first one.
    pub fn rebuild_stack(&mut self, frames: Vec<FrameLocation>) {
        self.next_frame_id = 0;
        self.frames.clear();

        for location in frames {
            let id = self.next_frame_id;
            self.next_frame_id += 1;
            let mut scopes = [0; 3];
            for scope in scopes.iter_mut() {
                *scope = self.next_variable_id;
                self.next_variable_id += 1;
            }
            self.frames.push(FrameEntry {
                frame: StackFrame {
                    id,
                    name: location.function,
                    source: Some(location.source),
                    line: location.line,
                    column: 0,
                },
                scopes,
            });
        }

        self.current_frame = self.frames.first().map(|entry| entry.frame.id);
    }

    /// All frames, innermost first.
    pub fn frames(&self) -> &[FrameEntry] {
        &self.frames
    }

    /// Look up a frame by id.
    pub fn frame(&self, id: i64) -> Option<&FrameEntry> {
        self.frames.iter().find(|entry| entry.frame.id == id)
    }

    /// Frame whose variables are being collected.
    pub fn current_frame(&self) -> Option<i64> {
        self.current_frame
    }

    /// Select the frame whose variables will be collected next.
    pub fn set_current_frame(&mut self, id: i64) {
        self.current_frame = Some(id);
    }

    /// Start a variable-collection pass for the current frame.
    ///
    /// Clears the three scope lists and expects `count` variables.
    pub fn begin_variables(&mut self, count: usize) -> Result<(), DapError> {
        let scopes = self.current_scopes()?;
        for id in scopes {
            self.variables.entry(id).or_default().clear();
        }
        self.remaining_vars = count;
        Ok(())
    }

    /// Append one variable to the scope its discriminant selects.
    pub fn push_variable(&mut self, var: &StackVariable) -> Result<(), DapError> {
        let scopes = self.current_scopes()?;
        let kind = ScopeKind::from_discriminant(var.scope).ok_or_else(|| {
            DapError::Consistency(format!(
                "variable '{}' has invalid scope {}",
                var.name, var.scope
            ))
        })?;
        let variable = Variable {
            name: var.name.clone(),
            value: var.display_value(),
            variable_type: Some(var.resolved_type()),
            variables_reference: 0,
        };
        self.variables
            .entry(scopes[kind.index()])
            .or_default()
            .push(variable);
        self.remaining_vars = self.remaining_vars.saturating_sub(1);
        Ok(())
    }

    /// Variables collected for a scope, if a pass has started for it.
    pub fn variables(&self, reference: i64) -> Option<&[Variable]> {
        self.variables.get(&reference).map(Vec::as_slice)
    }

    /// Frame owning the scope `reference`, if it belongs to the current stack.
    pub fn scope_owner(&self, reference: i64) -> Option<i64> {
        self.frames
            .iter()
            .find(|entry| entry.scopes.contains(&reference))
            .map(|entry| entry.frame.id)
    }

    /// Variables still expected in the running collection pass.
    pub fn remaining_vars(&self) -> usize {
        self.remaining_vars
    }

    /// Drop frames and variables; execution moved on.
    pub fn reset_stack_info(&mut self) {
        self.next_frame_id = 0;
        self.next_variable_id = 1;
        self.frames.clear();
        self.variables.clear();
        self.current_frame = None;
        self.remaining_vars = 0;
    }

    /// Drop everything; no client is connected any more.
    pub fn reset_ids(&mut self) {
        self.breakpoints.clear();
        self.stepping = false;
        self.processing_breakpoint = false;
        self.processing_stackdump = false;
        self.reset_stack_info();
    }

    fn current_scopes(&self) -> Result<[i64; 3], DapError> {
        let id = self
            .current_frame
            .ok_or_else(|| DapError::Consistency("no current stack frame".into()))?;
        self.frame(id)
            .map(|entry| entry.scopes)
            .ok_or_else(|| DapError::Consistency(format!("unknown stack frame {id}")))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
