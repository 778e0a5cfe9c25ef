//! Builders for outgoing responses and events.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::protocol::{
    ContinuedEventBody, ErrorMessage, Event, ExitedEventBody, OutputEventBody, ProcessEventBody,
    Request, Response, StopReason, StoppedEventBody,
};

/// The only thread the adapter reports.
pub const MAIN_THREAD_ID: i64 = 1;

/// Error keys reported in failed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Anything not covered below.
    Unknown,
    /// Client and editor work on different project paths.
    WrongPath,
    /// Nothing to attach to.
    NotRunning,
    /// A request took too long.
    Timeout,
    /// The requested platform is unknown.
    UnknownPlatform,
    /// The requested device is not connected.
    MissingDevice,
}

impl ErrorKind {
    /// Numeric id sent as `error.id`.
    pub fn id(self) -> i64 {
        match self {
            ErrorKind::Unknown => 0,
            ErrorKind::WrongPath => 1,
            ErrorKind::NotRunning => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::UnknownPlatform => 4,
            ErrorKind::MissingDevice => 5,
        }
    }

    /// Short key sent as the response `message`.
    pub fn key(self) -> &'static str {
        match self {
            ErrorKind::Unknown => "unknown",
            ErrorKind::WrongPath => "wrong_path",
            ErrorKind::NotRunning => "not_running",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnknownPlatform => "unknown_platform",
            ErrorKind::MissingDevice => "missing_device",
        }
    }

    /// Human-readable description; `{name}` placeholders refer to variables.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Unknown => "An unknown error has occurred when processing the request.",
            ErrorKind::WrongPath => {
                "The editor and client are working on different paths; the client is on \
                 \"{clientPath}\", but the editor is on \"{editorPath}\""
            }
            ErrorKind::NotRunning => "Can't attach to a running session since there isn't one.",
            ErrorKind::Timeout => "Timeout reached while processing a request.",
            ErrorKind::UnknownPlatform => "The specified platform is unknown.",
            ErrorKind::MissingDevice => "There's no connected device with specified id.",
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn response(
    request: &Request,
    command: &str,
    success: bool,
    message: Option<String>,
    body: Value,
) -> Value {
    to_value(Response {
        seq: None,
        message_type: "response".into(),
        request_seq: request.seq,
        success,
        command: command.to_string(),
        message,
        body: Some(body),
    })
}

fn event(name: &str, body: Option<Value>) -> Value {
    to_value(Event {
        seq: None,
        message_type: "event".into(),
        event: name.to_string(),
        body,
    })
}

/// Successful response to `request`.
pub fn success_response(request: &Request, body: Value) -> Value {
    response(request, &request.command, true, None, body)
}

/// Failed response to `request`.
pub fn error_response(request: &Request, kind: ErrorKind, variables: Map<String, Value>) -> Value {
    error_response_as(request, &request.command, kind, variables)
}

/// Failed response to `request` reported under another command name.
pub fn error_response_as(
    request: &Request,
    command: &str,
    kind: ErrorKind,
    variables: Map<String, Value>,
) -> Value {
    let error = ErrorMessage {
        id: kind.id(),
        format: kind.description().to_string(),
        variables,
    };
    response(
        request,
        command,
        false,
        Some(kind.key().to_string()),
        json!({ "error": to_value(error) }),
    )
}

/// `initialized` event.
pub fn ev_initialized() -> Value {
    event("initialized", None)
}

/// `process` event; `attached` selects the start method.
pub fn ev_process(name: &str, attached: bool) -> Value {
    let body = ProcessEventBody {
        name: name.to_string(),
        start_method: if attached { "attach" } else { "launch" }.to_string(),
    };
    event("process", Some(to_value(body)))
}

/// `terminated` event.
pub fn ev_terminated() -> Value {
    event("terminated", None)
}

/// `exited` event.
pub fn ev_exited(exit_code: i64) -> Value {
    event("exited", Some(to_value(ExitedEventBody { exit_code })))
}

fn stopped(
    reason: StopReason,
    text: Option<String>,
    hit_breakpoint_ids: Option<Vec<i64>>,
) -> Value {
    let body = StoppedEventBody {
        reason,
        description: None,
        thread_id: Some(MAIN_THREAD_ID),
        text,
        hit_breakpoint_ids,
    };
    event("stopped", Some(to_value(body)))
}

/// `stopped` event after a pause request.
pub fn ev_stopped_paused() -> Value {
    stopped(StopReason::Pause, None, None)
}

/// `stopped` event after a runtime error.
pub fn ev_stopped_exception(reason: &str) -> Value {
    stopped(StopReason::Exception, Some(reason.to_string()), None)
}

/// `stopped` event at a known breakpoint.
pub fn ev_stopped_breakpoint(id: i64) -> Value {
    stopped(StopReason::Breakpoint, None, Some(vec![id]))
}

/// `stopped` event after a step.
pub fn ev_stopped_step() -> Value {
    stopped(StopReason::Step, None, None)
}

/// `continued` event.
pub fn ev_continued() -> Value {
    let body = ContinuedEventBody {
        thread_id: MAIN_THREAD_ID,
        all_threads_continued: true,
    };
    event("continued", Some(to_value(body)))
}

/// `output` event carrying debuggee stdout.
pub fn ev_output(text: &str) -> Value {
    let body = OutputEventBody {
        category: Some("stdout".into()),
        output: text.to_string(),
    };
    event("output", Some(to_value(body)))
}
