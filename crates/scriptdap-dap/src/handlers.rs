//! Request handlers and the command table.
//!
//! Only commands registered in [`command_table`] can be reached from the
//! wire. Each handler gets the adapter, the decoded request and its
//! context, and answers with a [`Reply`].

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::adapter::{DebugAdapter, Reply, RequestContext};
use crate::capabilities::{adapter_capabilities, ClientCapabilities};
use crate::debugger::{normalize_path, DebuggerError};
use crate::message::{self, ErrorKind, MAIN_THREAD_ID};
use crate::outbox::Outbox;
use crate::protocol::{
    BreakpointLocation, BreakpointLocationsArguments, InitializeRequestArguments,
    LaunchRequestArguments, Request, Scope, ScopesArguments, SetBreakpointsArguments,
    StackTraceArguments, Thread, VariablesArguments,
};
use crate::session::ScopeKind;

/// Signature shared by all request handlers.
pub type RequestHandler = fn(&mut DebugAdapter, &Request, &RequestContext, &mut Outbox) -> Reply;

/// Build the command → handler table.
pub fn command_table() -> HashMap<&'static str, RequestHandler> {
    let entries: [(&'static str, RequestHandler); 18] = [
        ("initialize", req_initialize),
        ("launch", req_launch),
        ("configurationDone", req_configuration_done),
        ("attach", req_attach),
        ("restart", req_restart),
        ("terminate", req_terminate),
        ("disconnect", req_disconnect),
        ("pause", req_pause),
        ("continue", req_continue),
        ("next", req_next),
        ("stepIn", req_step_in),
        ("threads", req_threads),
        ("stackTrace", req_stack_trace),
        ("setBreakpoints", req_set_breakpoints),
        ("breakpointLocations", req_breakpoint_locations),
        ("setExceptionBreakpoints", req_set_exception_breakpoints),
        ("scopes", req_scopes),
        ("variables", req_variables),
    ];
    entries.into_iter().collect()
}

fn arguments<T: DeserializeOwned>(request: &Request) -> Result<T, serde_json::Error> {
    let args = request
        .arguments
        .clone()
        .unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(args)
}

fn success(request: &Request) -> Reply {
    Reply::Done(message::success_response(request, json!({})))
}

fn failure(request: &Request, kind: ErrorKind) -> Reply {
    Reply::Done(message::error_response(request, kind, Map::new()))
}

fn bad_arguments(request: &Request, e: serde_json::Error) -> Reply {
    tracing::warn!(command = %request.command, error = %e, "invalid arguments");
    failure(request, ErrorKind::Unknown)
}

fn wrong_path(adapter: &DebugAdapter, request: &Request, client_path: &str) -> Reply {
    let mut variables = Map::new();
    variables.insert("clientPath".into(), json!(client_path));
    variables.insert("editorPath".into(), json!(adapter.paths.project_root()));
    Reply::Done(message::error_response(request, ErrorKind::WrongPath, variables))
}

fn error_kind(e: &DebuggerError) -> ErrorKind {
    match e {
        DebuggerError::NotRunning => ErrorKind::NotRunning,
        DebuggerError::UnknownPlatform => ErrorKind::UnknownPlatform,
        DebuggerError::MissingDevice => ErrorKind::MissingDevice,
        DebuggerError::Failed(_) => ErrorKind::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

fn req_initialize(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Reply {
    let args: InitializeRequestArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    tracing::info!(
        peer = %ctx.peer,
        client = args.client_name.as_deref().unwrap_or("unknown"),
        "initialize"
    );
    adapter.client_mut(ctx.peer).capabilities = ClientCapabilities::from_initialize_request(&args);

    let body = serde_json::to_value(adapter_capabilities()).unwrap_or_else(|_| json!({}));
    adapter.notify_initialized(Some(ctx), outbox);
    Reply::Done(message::success_response(request, body))
}

fn req_launch(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Reply {
    let args: LaunchRequestArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    if let Some(project) = &args.project {
        if !adapter.paths.is_in_project(project) {
            return wrong_path(adapter, request, project);
        }
    }

    if adapter.client_mut(ctx.peer).configuration_done {
        return Reply::Done(launch_process(adapter, request, ctx, outbox));
    }
    adapter.client_mut(ctx.peer).pending_launch = Some(request.clone());
    Reply::Deferred
}

/// Run a launch request; the returned response answers `request`.
fn launch_process(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Value {
    let args: LaunchRequestArguments = arguments(request).unwrap_or_default();
    let launch_ctx = RequestContext::new("launch", ctx.peer);

    let result = adapter.debugger.launch(&args);
    adapter.process_signals(Some(&launch_ctx), outbox);
    if let Err(e) = result {
        tracing::warn!(peer = %ctx.peer, error = %e, "launch failed");
        return message::error_response(request, error_kind(&e), Map::new());
    }

    adapter.client_mut(ctx.peer).attached = false;
    adapter.notify_process(Some(&launch_ctx), outbox);
    message::success_response(request, json!({}))
}

fn req_configuration_done(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Reply {
    let client = adapter.client_mut(ctx.peer);
    client.configuration_done = true;
    if let Some(launch) = client.pending_launch.take() {
        let response = launch_process(adapter, &launch, ctx, outbox);
        outbox.send(ctx.peer, response);
    }
    success(request)
}

fn attach_process(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Value {
    if !adapter.debugger.is_session_active() {
        return message::error_response(request, ErrorKind::NotRunning, Map::new());
    }
    adapter.client_mut(ctx.peer).attached = true;
    adapter.notify_process(Some(ctx), outbox);
    message::success_response(request, json!({}))
}

fn req_attach(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Reply {
    Reply::Done(attach_process(adapter, request, ctx, outbox))
}

fn req_restart(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    outbox: &mut Outbox,
) -> Reply {
    // Attach/launch arguments travel nested one level down.
    let inner = Request {
        arguments: request
            .arguments
            .as_ref()
            .and_then(|args| args.get("arguments"))
            .cloned(),
        ..request.clone()
    };

    let attached = adapter.client(ctx.peer).is_some_and(|c| c.attached);
    let mut response = if attached {
        attach_process(adapter, &inner, ctx, outbox)
    } else {
        launch_process(adapter, &inner, ctx, outbox)
    };

    if response["success"] != json!(true) {
        response["command"] = json!(request.command);
        return Reply::Done(response);
    }
    success(request)
}

fn req_terminate(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    adapter.debugger.stop();
    success(request)
}

fn req_disconnect(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    let attached = adapter.client(ctx.peer).is_some_and(|c| c.attached);
    if !attached {
        adapter.debugger.stop();
    }
    success(request)
}

// ---------------------------------------------------------------------------
// Execution control
// ---------------------------------------------------------------------------

fn req_pause(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    adapter.debugger.request_break();
    success(request)
}

fn req_continue(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    adapter.debugger.request_continue();
    success(request)
}

fn req_next(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    adapter.session.stepping = true;
    adapter.debugger.request_next();
    success(request)
}

fn req_step_in(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    adapter.session.stepping = true;
    adapter.debugger.request_step();
    success(request)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

fn req_threads(
    _adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    let threads = vec![Thread {
        id: MAIN_THREAD_ID,
        name: "Main".into(),
    }];
    Reply::Done(message::success_response(request, json!({ "threads": threads })))
}

fn req_stack_trace(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    if adapter.session.processing_stackdump {
        return Reply::Pending;
    }
    let args: StackTraceArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    let caps = adapter.capabilities_of(ctx.peer);

    let all = adapter.session.frames();
    let start = args.start_frame.unwrap_or(0).max(0) as usize;
    let levels = match args.levels {
        Some(n) if n > 0 => n as usize,
        _ => all.len(),
    };
    let frames: Vec<_> = all
        .iter()
        .skip(start)
        .take(levels)
        .map(|entry| {
            let mut frame = entry.frame.clone();
            frame.line = caps.line_to_client(frame.line);
            frame.column = caps.column_to_client(frame.column);
            frame
        })
        .collect();

    Reply::Done(message::success_response(
        request,
        json!({ "stackFrames": frames, "totalFrames": all.len() }),
    ))
}

fn req_scopes(
    adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    let args: ScopesArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };

    let scopes: Vec<Scope> = match adapter.session.frame(args.frame_id) {
        Some(entry) => ScopeKind::ALL
            .iter()
            .map(|&kind| Scope {
                name: kind.name().into(),
                presentation_hint: Some(kind.presentation_hint().into()),
                variables_reference: entry.scope_id(kind),
                expensive: false,
            })
            .collect(),
        None => Vec::new(),
    };

    if scopes.is_empty() {
        tracing::debug!(frame = args.frame_id, "scopes for unknown frame");
    } else {
        adapter.session.set_current_frame(args.frame_id);
        adapter.debugger.request_stack_frame_vars(args.frame_id);
    }
    Reply::Done(message::success_response(request, json!({ "scopes": scopes })))
}

fn req_variables(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    // Variables are still streaming in.
    if adapter.session.remaining_vars() > 0 {
        return Reply::Pending;
    }
    let args: VariablesArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    let reference = args.variables_reference;

    if adapter.session.variables(reference).is_none() {
        return match adapter.session.scope_owner(reference) {
            Some(frame) => {
                // Scope of a frame whose variables were never fetched.
                if adapter.session.current_frame() != Some(frame) {
                    adapter.session.set_current_frame(frame);
                    adapter.debugger.request_stack_frame_vars(frame);
                }
                Reply::Pending
            }
            None => failure(request, ErrorKind::Unknown),
        };
    }

    let with_type = adapter.capabilities_of(ctx.peer).supports_variable_type;
    let variables: Vec<_> = adapter
        .session
        .variables(reference)
        .unwrap_or_default()
        .iter()
        .cloned()
        .map(|mut var| {
            if !with_type {
                var.variable_type = None;
            }
            var
        })
        .collect();
    Reply::Done(message::success_response(request, json!({ "variables": variables })))
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

fn req_set_breakpoints(
    adapter: &mut DebugAdapter,
    request: &Request,
    ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    let args: SetBreakpointsArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    let client_path = args.source.path.clone().unwrap_or_default();
    if client_path.is_empty() || !adapter.paths.is_in_project(&client_path) {
        return wrong_path(adapter, request, &client_path);
    }

    let caps = adapter.capabilities_of(ctx.peer);
    let path = normalize_path(&client_path);
    let lines: Vec<i64> = match (&args.breakpoints, &args.lines) {
        (Some(breakpoints), _) => breakpoints
            .iter()
            .map(|bp| caps.line_from_client(bp.line))
            .collect(),
        (None, Some(lines)) => lines.iter().map(|&l| caps.line_from_client(l)).collect(),
        (None, None) => Vec::new(),
    };

    let checksums = adapter.paths.checksums(&path);
    let registered = adapter.session.update_breakpoints(&path, &lines, checksums);

    let local = adapter.paths.localize(&path);
    for &line in &lines {
        adapter.debugger.set_breakpoint(&local, line, true);
    }
    let dropped = adapter
        .session
        .breakpoints_mut()
        .replace_active_lines(&path, &lines);
    for line in dropped {
        adapter.debugger.set_breakpoint(&local, line, false);
    }

    let breakpoints: Vec<_> = registered
        .iter()
        .map(|bp| bp.to_protocol(caps.line_to_client(bp.line)))
        .collect();
    tracing::debug!(%path, count = breakpoints.len(), "breakpoints set");
    Reply::Done(message::success_response(
        request,
        json!({ "breakpoints": breakpoints }),
    ))
}

fn req_breakpoint_locations(
    _adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    let args: BreakpointLocationsArguments = match arguments(request) {
        Ok(args) => args,
        Err(e) => return bad_arguments(request, e),
    };
    let locations = vec![BreakpointLocation {
        line: args.line,
        end_line: args.end_line,
    }];
    Reply::Done(message::success_response(
        request,
        json!({ "breakpoints": locations }),
    ))
}

fn req_set_exception_breakpoints(
    _adapter: &mut DebugAdapter,
    request: &Request,
    _ctx: &RequestContext,
    _outbox: &mut Outbox,
) -> Reply {
    success(request)
}
