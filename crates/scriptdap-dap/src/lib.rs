//! scriptdap-dap — Debug Adapter Protocol server for a script debugger.
//!
//! This crate accepts DAP clients over TCP, frames and dispatches their
//! requests, and bridges them to a script debugger behind the
//! [`Debugger`] trait. Everything runs from [`DapServer::poll`]; no
//! threads are spawned.

pub mod adapter;
pub mod breakpoint;
pub mod capabilities;
pub mod debugger;
pub mod error;
pub mod framing;
pub mod handlers;
pub mod message;
pub mod outbox;
pub mod peer;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export key types for convenience.
pub use adapter::{ClientInfo, DebugAdapter, Reply, RequestContext};
pub use capabilities::ClientCapabilities;
pub use debugger::{
    Debugger, DebuggerError, DebuggerSignal, EditorHooks, FsProjectPaths, ProjectPaths, StackInfo,
    StackVariable, TracingEditor,
};
pub use error::DapError;
pub use outbox::{Delivery, Outbox};
pub use peer::{Peer, PeerId, PeerStream, StreamStatus};
pub use server::{DapServer, Listener, ServerOptions, DEFAULT_MAX_CLIENTS};
pub use session::SessionState;
