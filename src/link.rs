//! Bridge to a script runtime speaking JSON lines on stdin/stdout.
//!
//! The runtime writes one [`FeedMessage`] per line to our stdin and reads
//! one [`LinkCommand`] per line from our stdout.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use scriptdap_dap::protocol::LaunchRequestArguments;
use scriptdap_dap::{Debugger, DebuggerError, DebuggerSignal};

/// Platform name that needs no device.
const HOST_PLATFORM: &str = "host";

/// Command sent to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub(crate) enum LinkCommand {
    Launch {
        #[serde(flatten)]
        args: LaunchRequestArguments,
    },
    Stop,
    Break,
    Continue,
    Next,
    Step,
    SetBreakpoint {
        path: String,
        line: i64,
        enabled: bool,
    },
    GetStackFrameVars {
        frame: i64,
    },
}

/// Runtime state pushed alongside signals.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct StateUpdate {
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub active: bool,
    /// Launch targets other than the host, with their device count.
    #[serde(default)]
    pub platforms: HashMap<String, i64>,
}

/// One line of the runtime feed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FeedMessage {
    State(StateUpdate),
    Signal(DebuggerSignal),
}

/// Decode one feed line. `{"signal":"state",...}` is a state update;
/// everything else must be a [`DebuggerSignal`].
pub(crate) fn parse_feed_line(line: &str) -> Result<FeedMessage, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("signal").and_then(serde_json::Value::as_str) == Some("state") {
        return serde_json::from_value(value).map(FeedMessage::State);
    }
    serde_json::from_value(value).map(FeedMessage::Signal)
}

/// Read feed lines until EOF, forwarding decoded messages.
pub(crate) async fn read_feed<R>(input: R, tx: mpsc::Sender<FeedMessage>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_feed_line(line) {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed feed line"),
        }
    }
    tracing::info!("runtime feed closed");
    Ok(())
}

/// Write commands as JSON lines until every sender is gone.
pub(crate) async fn write_commands<W>(
    mut rx: mpsc::UnboundedReceiver<LinkCommand>,
    mut output: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let mut line = match serde_json::to_vec(&command) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, ?command, "cannot encode command");
                continue;
            }
        };
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RuntimeState {
    paused: bool,
    active: bool,
    platforms: HashMap<String, i64>,
    signals: Vec<DebuggerSignal>,
}

/// Main-task side of the link: applies feed messages and hands the
/// adapter a [`Debugger`] backed by the same state.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeLink {
    state: Rc<RefCell<RuntimeState>>,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl RuntimeLink {
    pub(crate) fn new(commands: mpsc::UnboundedSender<LinkCommand>) -> Self {
        Self {
            state: Rc::new(RefCell::new(RuntimeState::default())),
            commands,
        }
    }

    /// A debugger sharing this link's state.
    pub(crate) fn debugger(&self) -> StdioDebugger {
        StdioDebugger(self.clone())
    }

    /// Record a feed message; signals wait for the next server poll.
    pub(crate) fn apply(&self, message: FeedMessage) {
        let mut state = self.state.borrow_mut();
        match message {
            FeedMessage::State(update) => {
                state.paused = update.paused;
                state.active = update.active;
                state.platforms = update.platforms;
            }
            FeedMessage::Signal(signal) => state.signals.push(signal),
        }
    }

    fn send(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("runtime link closed, command dropped");
        }
    }
}

/// [`Debugger`] that forwards every request to the runtime.
#[derive(Debug)]
pub(crate) struct StdioDebugger(RuntimeLink);

impl StdioDebugger {
    fn check_target(&self, args: &LaunchRequestArguments) -> Result<(), DebuggerError> {
        let platform = args.platform.as_deref().unwrap_or(HOST_PLATFORM);
        if platform == HOST_PLATFORM {
            return Ok(());
        }
        let state = self.0.state.borrow();
        let devices = *state
            .platforms
            .get(platform)
            .ok_or(DebuggerError::UnknownPlatform)?;
        match args.device {
            Some(device) if device < 0 || device >= devices => Err(DebuggerError::MissingDevice),
            _ => Ok(()),
        }
    }
}

impl Debugger for StdioDebugger {
    fn is_paused(&self) -> bool {
        self.0.state.borrow().paused
    }

    fn is_session_active(&self) -> bool {
        self.0.state.borrow().active
    }

    fn launch(&mut self, args: &LaunchRequestArguments) -> Result<(), DebuggerError> {
        self.check_target(args)?;
        {
            let mut state = self.0.state.borrow_mut();
            // A running instance is replaced.
            if state.active {
                state.signals.push(DebuggerSignal::Stopped);
            }
            state.active = true;
            state.paused = false;
        }
        self.0.send(LinkCommand::Launch { args: args.clone() });
        Ok(())
    }

    fn stop(&mut self) {
        self.0.state.borrow_mut().active = false;
        self.0.send(LinkCommand::Stop);
    }

    fn request_break(&mut self) {
        self.0.send(LinkCommand::Break);
    }

    fn request_continue(&mut self) {
        self.0.send(LinkCommand::Continue);
    }

    fn request_next(&mut self) {
        self.0.send(LinkCommand::Next);
    }

    fn request_step(&mut self) {
        self.0.send(LinkCommand::Step);
    }

    fn set_breakpoint(&mut self, path: &str, line: i64, enabled: bool) {
        self.0.send(LinkCommand::SetBreakpoint {
            path: path.to_string(),
            line,
            enabled,
        });
    }

    fn request_stack_frame_vars(&mut self, frame: i64) {
        self.0.send(LinkCommand::GetStackFrameVars { frame });
    }

    fn take_signals(&mut self) -> Vec<DebuggerSignal> {
        std::mem::take(&mut self.0.state.borrow_mut().signals)
    }
}
