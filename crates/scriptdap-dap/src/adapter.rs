//! Request dispatch, event fan-out and the debugger signal bridge.

use std::collections::HashMap;

use serde_json::Value;

use crate::capabilities::ClientCapabilities;
use crate::debugger::{Debugger, DebuggerSignal, EditorHooks, ProjectPaths, StackInfo};
use crate::handlers::{self, RequestHandler};
use crate::message;
use crate::outbox::Outbox;
use crate::peer::PeerId;
use crate::protocol::{Request, Source};
use crate::session::{FrameLocation, SessionState};

/// Identifies the request being handled while its handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Command of the in-flight request.
    pub command: String,
    /// Peer that sent it.
    pub peer: PeerId,
}

impl RequestContext {
    /// Context for `command` sent by `peer`.
    pub fn new(command: impl Into<String>, peer: PeerId) -> Self {
        Self {
            command: command.into(),
            peer,
        }
    }

    fn peer_if(ctx: Option<&RequestContext>, command: &str) -> Option<PeerId> {
        ctx.filter(|c| c.command == command).map(|c| c.peer)
    }
}

/// Outcome of a request handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Send this response now.
    Done(Value),
    /// Consumed; a later request sends the response.
    Deferred,
    /// Not handled yet; offer the same request again on the next poll.
    Pending,
}

/// What the adapter remembers about one client.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Numbering and display preferences from `initialize`.
    pub capabilities: ClientCapabilities,
    /// The client attached to a running session instead of launching one.
    pub attached: bool,
    /// `launch` waiting for `configurationDone`.
    pub pending_launch: Option<Request>,
    /// `configurationDone` was received.
    pub configuration_done: bool,
}

/// The protocol engine minus sockets.
///
/// Owns the session state, per-client info and the collaborators. All
/// output goes through an [`Outbox`] supplied by the caller.
pub struct DebugAdapter {
    pub(crate) session: SessionState,
    pub(crate) clients: HashMap<PeerId, ClientInfo>,
    pub(crate) debugger: Box<dyn Debugger>,
    pub(crate) editor: Box<dyn EditorHooks>,
    pub(crate) paths: Box<dyn ProjectPaths>,
    handlers: HashMap<&'static str, RequestHandler>,
}

impl std::fmt::Debug for DebugAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugAdapter")
            .field("session", &self.session)
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}

impl DebugAdapter {
    /// Create an adapter around its collaborators.
    pub fn new(
        debugger: Box<dyn Debugger>,
        editor: Box<dyn EditorHooks>,
        paths: Box<dyn ProjectPaths>,
    ) -> Self {
        Self {
            session: SessionState::new(),
            clients: HashMap::new(),
            debugger,
            editor,
            paths,
            handlers: handlers::command_table(),
        }
    }

    /// Session bookkeeping.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// What is known about `peer`.
    pub fn client(&self, peer: PeerId) -> Option<&ClientInfo> {
        self.clients.get(&peer)
    }

    /// Commands the dispatcher accepts.
    pub fn commands(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub(crate) fn client_mut(&mut self, peer: PeerId) -> &mut ClientInfo {
        self.clients.entry(peer).or_default()
    }

    pub(crate) fn capabilities_of(&self, peer: PeerId) -> ClientCapabilities {
        self.clients
            .get(&peer)
            .map(|c| c.capabilities.clone())
            .unwrap_or_default()
    }

    /// Handle one decoded message from `peer`. Returns whether it was
    /// handled; `false` asks the peer to offer it again later.
    pub fn dispatch(&mut self, text: &str, peer: PeerId, outbox: &mut Outbox) -> bool {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "malformed message");
                return true;
            }
        };
        let Some(command) = value.get("command").and_then(Value::as_str) else {
            tracing::warn!(%peer, "message without command");
            return true;
        };
        let Some(handler) = self.handlers.get(command).copied() else {
            tracing::debug!(%peer, command, "unknown command");
            return true;
        };
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "malformed request");
                return true;
            }
        };

        let ctx = RequestContext::new(request.command.clone(), peer);
        tracing::debug!(%peer, command = %ctx.command, seq = request.seq, "dispatch");
        let reply = handler(self, &request, &ctx, outbox);
        self.process_signals(Some(&ctx), outbox);

        match reply {
            Reply::Done(response) => {
                outbox.respond(peer, response);
                true
            }
            Reply::Deferred => true,
            Reply::Pending => {
                tracing::trace!(%peer, command = %ctx.command, "request pending");
                false
            }
        }
    }

    /// Register a newly accepted client.
    pub fn on_peer_connected(&mut self, peer: PeerId) {
        self.clients.insert(peer, ClientInfo::default());
        self.editor.set_move_to_foreground(false);
        self.editor.log_message("[DAP] Connection Taken");
        tracing::info!(%peer, "client connected");
    }

    /// Forget a client; the last one out resets the session.
    pub fn on_peer_disconnected(&mut self, peer: PeerId) {
        self.clients.remove(&peer);
        if self.clients.is_empty() {
            self.session.reset_ids();
            self.editor.set_move_to_foreground(true);
        }
        self.editor.log_message("[DAP] Disconnected");
        tracing::info!(%peer, "client disconnected");
    }

    /// Handle every signal the debugger raised since the last call.
    pub fn process_signals(&mut self, ctx: Option<&RequestContext>, outbox: &mut Outbox) {
        loop {
            let signals = self.debugger.take_signals();
            if signals.is_empty() {
                break;
            }
            for signal in signals {
                self.on_debugger_signal(signal, ctx, outbox);
            }
        }
    }

    /// Translate one debugger signal into events and state changes.
    pub fn on_debugger_signal(
        &mut self,
        signal: DebuggerSignal,
        ctx: Option<&RequestContext>,
        outbox: &mut Outbox,
    ) {
        match signal {
            DebuggerSignal::Paused => {
                if self.debugger.is_paused() {
                    outbox.broadcast(message::ev_stopped_paused(), None);
                } else {
                    self.notify_continued(ctx, outbox);
                }
            }
            DebuggerSignal::Stopped => {
                self.notify_exited(ctx, 0, outbox);
                self.notify_terminated(ctx, outbox);
            }
            DebuggerSignal::Output { text } => {
                outbox.broadcast(message::ev_output(&text), None);
            }
            DebuggerSignal::Breaked {
                really_did,
                can_debug: _,
                reason,
                has_stackdump,
            } => self.on_breaked(really_did, &reason, has_stackdump, ctx, outbox),
            DebuggerSignal::StackDump { frames } => self.on_stack_dump(frames, outbox),
            DebuggerSignal::StackFrameVars { count } => {
                if let Err(e) = self.session.begin_variables(count) {
                    tracing::error!(error = %e, "dropping variable count");
                }
            }
            DebuggerSignal::StackFrameVar(var) => {
                if let Err(e) = self.session.push_variable(&var) {
                    tracing::error!(error = %e, name = %var.name, "dropping variable");
                }
            }
        }
    }

    /// Queue `initialized` for the requesting client.
    pub fn notify_initialized(&mut self, ctx: Option<&RequestContext>, outbox: &mut Outbox) {
        match ctx {
            Some(ctx) => outbox.send(ctx.peer, message::ev_initialized()),
            None => tracing::warn!("initialized event without a requesting client"),
        }
    }

    /// Tell every client how the requesting client started the session.
    pub fn notify_process(&mut self, ctx: Option<&RequestContext>, outbox: &mut Outbox) {
        let attached = ctx
            .and_then(|c| self.clients.get(&c.peer))
            .is_some_and(|c| c.attached);
        outbox.broadcast(message::ev_process(&self.project_name(), attached), None);
    }

    /// `terminated` to everyone but a client that is launching.
    pub fn notify_terminated(&mut self, ctx: Option<&RequestContext>, outbox: &mut Outbox) {
        outbox.broadcast(
            message::ev_terminated(),
            RequestContext::peer_if(ctx, "launch"),
        );
    }

    /// `exited` to everyone but a client that is launching.
    pub fn notify_exited(
        &mut self,
        ctx: Option<&RequestContext>,
        exit_code: i64,
        outbox: &mut Outbox,
    ) {
        outbox.broadcast(
            message::ev_exited(exit_code),
            RequestContext::peer_if(ctx, "launch"),
        );
    }

    /// `continued` to everyone but the client that asked for it; frames
    /// and variables become stale.
    pub fn notify_continued(&mut self, ctx: Option<&RequestContext>, outbox: &mut Outbox) {
        outbox.broadcast(
            message::ev_continued(),
            RequestContext::peer_if(ctx, "continue"),
        );
        self.session.reset_stack_info();
    }

    fn on_breaked(
        &mut self,
        really_did: bool,
        reason: &str,
        has_stackdump: bool,
        ctx: Option<&RequestContext>,
        outbox: &mut Outbox,
    ) {
        if !really_did {
            self.notify_continued(ctx, outbox);
            return;
        }

        if reason == "Breakpoint" {
            if self.session.stepping {
                outbox.broadcast(message::ev_stopped_step(), None);
                self.session.stepping = false;
            } else {
                // The stack dump tells which breakpoint it was.
                self.session.processing_breakpoint = true;
            }
        } else {
            outbox.broadcast(message::ev_stopped_exception(reason), None);
        }

        self.session.processing_stackdump = has_stackdump;
    }

    fn on_stack_dump(&mut self, frames: Vec<StackInfo>, outbox: &mut Outbox) {
        if self.session.processing_breakpoint {
            if let Some(top) = frames.first() {
                let path = self.paths.globalize(&top.file);
                match self.session.find_breakpoint(&path, top.line) {
                    Some(bp) => outbox.broadcast(message::ev_stopped_breakpoint(bp.id), None),
                    None => tracing::debug!(%path, line = top.line, "break at unknown breakpoint"),
                }
                self.session.processing_breakpoint = false;
            }
        }

        let locations = frames
            .into_iter()
            .map(|info| {
                let path = self.paths.globalize(&info.file);
                let checksums = self.paths.checksums(&path);
                FrameLocation {
                    function: info.function,
                    source: Source::from_path(&path, checksums),
                    line: info.line,
                }
            })
            .collect();
        self.session.rebuild_stack(locations);
        self.session.processing_stackdump = false;
    }

    fn project_name(&self) -> String {
        let root = self.paths.project_root();
        root.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("project")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{DebuggerError, FsProjectPaths, StackVariable, TracingEditor};
    use crate::outbox::Delivery;
    use crate::protocol::LaunchRequestArguments;
    use serde_json::json;

    #[derive(Default)]
    struct QuietDebugger {
        paused: bool,
    }

    impl Debugger for QuietDebugger {
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn is_session_active(&self) -> bool {
            true
        }
        fn launch(&mut self, _args: &LaunchRequestArguments) -> Result<(), DebuggerError> {
            Ok(())
        }
        fn stop(&mut self) {}
        fn request_break(&mut self) {}
        fn request_continue(&mut self) {}
        fn request_next(&mut self) {}
        fn request_step(&mut self) {}
        fn set_breakpoint(&mut self, _path: &str, _line: i64, _enabled: bool) {}
        fn request_stack_frame_vars(&mut self, _frame: i64) {}
    }

    fn adapter() -> DebugAdapter {
        DebugAdapter::new(
            Box::new(QuietDebugger::default()),
            Box::new(TracingEditor::default()),
            Box::new(FsProjectPaths::new("/game")),
        )
    }

    fn events(outbox: &mut Outbox) -> Vec<(String, Option<PeerId>)> {
        outbox
            .drain()
            .filter_map(|d| match d {
                Delivery::Broadcast { message, skip } => {
                    Some((message["event"].as_str().unwrap_or_default().to_string(), skip))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn adapter_ignores_malformed_and_unknown_messages() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        assert!(a.dispatch("{not json", PeerId(0), &mut outbox));
        assert!(a.dispatch(r#"{"seq":1}"#, PeerId(0), &mut outbox));
        assert!(a.dispatch(r#"{"command":"evaluate","seq":1}"#, PeerId(0), &mut outbox));
        assert!(outbox.is_empty());
    }

    #[test]
    fn adapter_known_command_is_answered() {
        let mut a = adapter();
        a.on_peer_connected(PeerId(0));
        let mut outbox = Outbox::new();
        assert!(a.dispatch(r#"{"command":"threads","seq":3}"#, PeerId(0), &mut outbox));
        match &outbox.deliveries()[0] {
            Delivery::Front(peer, response) => {
                assert_eq!(*peer, PeerId(0));
                assert_eq!(response["request_seq"], 3);
                assert_eq!(response["body"]["threads"][0]["name"], "Main");
            }
            other => panic!("unexpected delivery {other:?}"),
        }
    }

    #[test]
    fn adapter_command_table_is_closed() {
        let a = adapter();
        let mut commands: Vec<_> = a.commands().collect();
        commands.sort_unstable();
        assert!(commands.contains(&"setBreakpoints"));
        assert!(!commands.contains(&"evaluate"));
        assert_eq!(commands.len(), 18);
    }

    #[test]
    fn adapter_breaked_on_breakpoint_waits_for_stack_dump() {
        let mut a = adapter();
        a.session.update_breakpoints("/game/player.gd", &[12], Vec::new());
        let mut outbox = Outbox::new();

        a.on_debugger_signal(
            DebuggerSignal::Breaked {
                really_did: true,
                can_debug: true,
                reason: "Breakpoint".into(),
                has_stackdump: true,
            },
            None,
            &mut outbox,
        );
        assert!(outbox.is_empty());
        assert!(a.session.processing_stackdump);

        a.on_debugger_signal(
            DebuggerSignal::StackDump {
                frames: vec![StackInfo {
                    file: "res://player.gd".into(),
                    function: "_process".into(),
                    line: 12,
                }],
            },
            None,
            &mut outbox,
        );
        let delivered: Vec<_> = outbox.drain().collect();
        match &delivered[0] {
            Delivery::Broadcast { message, .. } => {
                assert_eq!(message["body"]["reason"], "breakpoint");
                assert_eq!(message["body"]["hitBreakpointIds"], json!([0]));
            }
            other => panic!("unexpected delivery {other:?}"),
        }
        assert!(!a.session.processing_stackdump);
        assert_eq!(a.session.current_frame(), Some(0));
        assert_eq!(
            a.session.frames()[0].frame.source.as_ref().unwrap().path.as_deref(),
            Some("/game/player.gd")
        );
    }

    #[test]
    fn adapter_step_break_reports_step() {
        let mut a = adapter();
        a.session.stepping = true;
        let mut outbox = Outbox::new();
        a.on_debugger_signal(
            DebuggerSignal::Breaked {
                really_did: true,
                can_debug: true,
                reason: "Breakpoint".into(),
                has_stackdump: false,
            },
            None,
            &mut outbox,
        );
        assert_eq!(events(&mut outbox), vec![("stopped".to_string(), None)]);
        assert!(!a.session.stepping);
        assert!(!a.session.processing_breakpoint);
    }

    #[test]
    fn adapter_error_break_reports_exception() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        a.on_debugger_signal(
            DebuggerSignal::Breaked {
                really_did: true,
                can_debug: true,
                reason: "Invalid call".into(),
                has_stackdump: true,
            },
            None,
            &mut outbox,
        );
        match &outbox.deliveries()[0] {
            Delivery::Broadcast { message, .. } => {
                assert_eq!(message["body"]["reason"], "exception");
                assert_eq!(message["body"]["text"], "Invalid call");
            }
            other => panic!("unexpected delivery {other:?}"),
        }
    }

    #[test]
    fn adapter_cancelled_break_continues_and_resets_stack() {
        let mut a = adapter();
        a.session.rebuild_stack(vec![FrameLocation {
            function: "f".into(),
            source: Source::from_path("/game/a.gd", Vec::new()),
            line: 1,
        }]);
        let mut outbox = Outbox::new();
        let ctx = RequestContext::new("continue", PeerId(4));
        a.on_debugger_signal(
            DebuggerSignal::Breaked {
                really_did: false,
                can_debug: false,
                reason: String::new(),
                has_stackdump: false,
            },
            Some(&ctx),
            &mut outbox,
        );
        assert_eq!(
            events(&mut outbox),
            vec![("continued".to_string(), Some(PeerId(4)))]
        );
        assert!(a.session.frames().is_empty());
    }

    #[test]
    fn adapter_stopped_skips_launching_client() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        let ctx = RequestContext::new("launch", PeerId(2));
        a.on_debugger_signal(DebuggerSignal::Stopped, Some(&ctx), &mut outbox);
        assert_eq!(
            events(&mut outbox),
            vec![
                ("exited".to_string(), Some(PeerId(2))),
                ("terminated".to_string(), Some(PeerId(2))),
            ]
        );

        a.on_debugger_signal(DebuggerSignal::Stopped, None, &mut outbox);
        assert_eq!(
            events(&mut outbox),
            vec![("exited".to_string(), None), ("terminated".to_string(), None)]
        );
    }

    #[test]
    fn adapter_variable_for_unknown_frame_is_dropped() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        a.on_debugger_signal(
            DebuggerSignal::StackFrameVar(StackVariable {
                name: "x".into(),
                value: json!(1),
                scope: 0,
                type_name: None,
            }),
            None,
            &mut outbox,
        );
        assert!(outbox.is_empty());
        assert_eq!(a.session.remaining_vars(), 0);
    }

    #[test]
    fn adapter_initialized_needs_a_requesting_client() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        a.notify_initialized(None, &mut outbox);
        assert!(outbox.is_empty());
        a.notify_initialized(Some(&RequestContext::new("initialize", PeerId(1))), &mut outbox);
        assert!(matches!(outbox.deliveries()[0], Delivery::Back(PeerId(1), _)));
    }

    #[test]
    fn adapter_last_disconnect_resets_session() {
        let mut a = adapter();
        a.on_peer_connected(PeerId(0));
        a.on_peer_connected(PeerId(1));
        a.session.update_breakpoints("/game/a.gd", &[1, 2], Vec::new());

        a.on_peer_disconnected(PeerId(0));
        assert_eq!(a.session.breakpoints().len(), 2);
        a.on_peer_disconnected(PeerId(1));
        assert!(a.session.breakpoints().is_empty());
    }

    #[test]
    fn adapter_process_event_names_project() {
        let mut a = adapter();
        let mut outbox = Outbox::new();
        a.notify_process(None, &mut outbox);
        match &outbox.deliveries()[0] {
            Delivery::Broadcast { message, .. } => {
                assert_eq!(message["body"]["name"], "game");
                assert_eq!(message["body"]["startMethod"], "launch");
            }
            other => panic!("unexpected delivery {other:?}"),
        }
    }
}
