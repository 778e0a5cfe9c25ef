//! Poll-driven TCP server hosting the adapter.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr, TcpListener};

use crate::adapter::DebugAdapter;
use crate::debugger::DebuggerSignal;
use crate::error::DapError;
use crate::framing::DEFAULT_MAX_BUFFER_SIZE;
use crate::outbox::{Delivery, Outbox};
use crate::peer::{Peer, PeerId, PeerStream, StreamStatus};

/// Default number of simultaneous clients.
pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// Source of new connections.
pub trait Listener {
    /// Take one pending connection without blocking.
    fn accept(&self) -> io::Result<Option<Box<dyn PeerStream>>>;
    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Listener for TcpListener {
    fn accept(&self) -> io::Result<Option<Box<dyn PeerStream>>> {
        match TcpListener::accept(self) {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                tracing::debug!(%addr, "accepted connection");
                Ok(Some(Box::new(stream)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Limits applied to connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Connections beyond this many are closed on arrival.
    pub max_clients: usize,
    /// Largest header or body accepted from a client.
    pub max_buffer_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

/// DAP server: listener, peers and the adapter they talk to.
///
/// Nothing blocks and nothing escapes [`DapServer::poll`]; call it
/// periodically from one thread.
pub struct DapServer {
    adapter: DebugAdapter,
    listener: Option<Box<dyn Listener>>,
    peers: Vec<Peer>,
    next_peer_id: u64,
    options: ServerOptions,
    outbox: Outbox,
}

impl std::fmt::Debug for DapServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DapServer")
            .field("listening", &self.listener.is_some())
            .field("peers", &self.peers)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DapServer {
    /// Create a stopped server.
    pub fn new(adapter: DebugAdapter, options: ServerOptions) -> Self {
        Self {
            adapter,
            listener: None,
            peers: Vec::new(),
            next_peer_id: 0,
            options,
            outbox: Outbox::new(),
        }
    }

    /// Listen on `bind_address:port`.
    pub fn start(&mut self, port: u16, bind_address: IpAddr) -> Result<(), DapError> {
        let address = SocketAddr::new(bind_address, port);
        let bind_error = |source| DapError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        tracing::info!(%address, "DAP server listening");
        self.listener = Some(Box::new(listener));
        Ok(())
    }

    /// Serve connections from an already-open listener.
    pub fn start_with_listener(&mut self, listener: Box<dyn Listener>) {
        self.listener = Some(listener);
    }

    /// Disconnect every client, close the listener and reset the session.
    pub fn stop(&mut self) {
        for peer in self.peers.drain(..) {
            peer.shutdown();
            self.adapter.on_peer_disconnected(peer.id());
        }
        self.outbox.clear();
        if self.listener.take().is_some() {
            tracing::info!("DAP server stopped");
        }
    }

    /// Whether a listener is open.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Bound address, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Number of connected clients.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// The hosted adapter.
    pub fn adapter(&self) -> &DebugAdapter {
        &self.adapter
    }

    /// Feed a signal raised outside of request handling.
    pub fn on_debugger_signal(&mut self, signal: DebuggerSignal) {
        self.adapter.on_debugger_signal(signal, None, &mut self.outbox);
        deliver(&mut self.peers, &mut self.outbox);
    }

    /// One server tick: signals, new connections, then every peer once.
    pub fn poll(&mut self) {
        self.adapter.process_signals(None, &mut self.outbox);
        deliver(&mut self.peers, &mut self.outbox);

        self.accept_pending();

        let mut to_remove = Vec::new();
        for index in 0..self.peers.len() {
            let Self {
                peers,
                adapter,
                outbox,
                ..
            } = &mut *self;
            let peer = &mut peers[index];
            let id = peer.id();

            match peer.status() {
                StreamStatus::Connected => {}
                status => {
                    tracing::debug!(peer = %id, ?status, "stream gone");
                    to_remove.push(id);
                    continue;
                }
            }

            if let Err(e) = peer.handle_inbound(|text| adapter.dispatch(text, id, outbox)) {
                log_peer_error(id, &e);
                to_remove.push(id);
                continue;
            }

            deliver(peers, outbox);
            if let Err(e) = peers[index].handle_outbound() {
                log_peer_error(id, &e);
                to_remove.push(id);
            }
        }

        for id in to_remove {
            if let Some(pos) = self.peers.iter().position(|p| p.id() == id) {
                let peer = self.peers.remove(pos);
                peer.shutdown();
                self.adapter.on_peer_disconnected(id);
            }
        }

        deliver(&mut self.peers, &mut self.outbox);
    }

    fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        let stream = match listener.accept() {
            Ok(Some(stream)) => stream,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                return;
            }
        };

        if self.peers.len() >= self.options.max_clients {
            if let Err(e) = stream.shutdown() {
                tracing::debug!(error = %e, "closing rejected connection");
            }
            let e = DapError::TooManyClients {
                max: self.options.max_clients,
            };
            tracing::error!(error = %e, "rejecting connection");
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(error = %e, "failed to set TCP_NODELAY");
        }
        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;
        self.peers.push(Peer::new(id, stream, self.options.max_buffer_size));
        self.adapter.on_peer_connected(id);
    }
}

fn log_peer_error(id: PeerId, e: &DapError) {
    match e {
        DapError::ConnectionClosed => tracing::debug!(peer = %id, "connection closed"),
        other => tracing::warn!(peer = %id, error = %other, "dropping client"),
    }
}

/// Move queued deliveries onto peer queues.
///
/// Responses keep their relative order but go ahead of events; messages
/// for peers that are gone are dropped.
fn deliver(peers: &mut [Peer], outbox: &mut Outbox) {
    let mut fronted: HashMap<PeerId, usize> = HashMap::new();
    for delivery in outbox.drain() {
        match delivery {
            Delivery::Front(id, message) => match peers.iter_mut().find(|p| p.id() == id) {
                Some(peer) => {
                    let at = fronted.entry(id).or_insert(0);
                    peer.insert(*at, message);
                    *at += 1;
                }
                None => tracing::debug!(peer = %id, "dropping response for departed client"),
            },
            Delivery::Back(id, message) => match peers.iter_mut().find(|p| p.id() == id) {
                Some(peer) => peer.push_back(message),
                None => tracing::debug!(peer = %id, "dropping event for departed client"),
            },
            Delivery::Broadcast { message, skip } => {
                for peer in peers.iter_mut().filter(|p| Some(p.id()) != skip) {
                    peer.push_back(message.clone());
                }
            }
        }
    }
}
