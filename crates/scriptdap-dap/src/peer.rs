//! One connected DAP client.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::DapError;
use crate::framing::{encode_message, Framer};

const READ_CHUNK: usize = 4096;

/// Identifier of a peer, never reused within one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Connection state reported by a [`PeerStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Usable.
    Connected,
    /// Closed by either side.
    Closed,
    /// The socket reported an error.
    Error,
}

/// A non-blocking byte stream to a client.
pub trait PeerStream: Read + Write {
    /// Current connection state.
    fn status(&self) -> StreamStatus {
        StreamStatus::Connected
    }

    /// Disable Nagle's algorithm.
    fn set_nodelay(&self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }

    /// Close both directions.
    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }
}

impl PeerStream for TcpStream {
    fn status(&self) -> StreamStatus {
        match self.take_error() {
            Ok(None) => StreamStatus::Connected,
            Ok(Some(_)) | Err(_) => StreamStatus::Error,
        }
    }

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, nodelay)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Result of one inbound or outbound pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Everything available was processed.
    Ok,
    /// Work is left for the next poll (partial message or partial write).
    WouldBlock,
}

#[derive(Debug)]
struct PendingWrite {
    bytes: Vec<u8>,
    offset: usize,
}

/// A client connection: stream, inbound framer and outbound queue.
pub struct Peer {
    id: PeerId,
    stream: Box<dyn PeerStream>,
    framer: Framer,
    outbound: VecDeque<serde_json::Value>,
    seq: i64,
    pending_write: Option<PendingWrite>,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("queued", &self.outbound.len())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl Peer {
    /// Wrap an accepted stream.
    pub fn new(id: PeerId, stream: Box<dyn PeerStream>, max_buffer_size: usize) -> Self {
        Self {
            id,
            stream,
            framer: Framer::new(max_buffer_size),
            outbound: VecDeque::new(),
            seq: 0,
            pending_write: None,
        }
    }

    /// This peer's id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// State of the underlying stream.
    pub fn status(&self) -> StreamStatus {
        self.stream.status()
    }

    /// Disable Nagle's algorithm on the stream.
    pub fn set_nodelay(&self) -> io::Result<()> {
        self.stream.set_nodelay(true)
    }

    /// Close the stream.
    pub fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown() {
            tracing::debug!(peer = %self.id, error = %e, "shutdown failed");
        }
    }

    /// Queue a message ahead of everything else.
    pub fn push_front(&mut self, message: serde_json::Value) {
        self.outbound.push_front(message);
    }

    /// Queue a message behind everything else.
    pub fn push_back(&mut self, message: serde_json::Value) {
        self.outbound.push_back(message);
    }

    /// Queue a message at `index`, or last if the queue is shorter.
    pub fn insert(&mut self, index: usize, message: serde_json::Value) {
        let index = index.min(self.outbound.len());
        self.outbound.insert(index, message);
    }

    /// Queued messages, next to be written first.
    pub fn queue(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.outbound.iter()
    }

    /// Messages waiting to be written (excluding a half-written one).
    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Whether a message is partially written.
    #[cfg(test)]
    pub(crate) fn has_pending_write(&self) -> bool {
        self.pending_write.is_some()
    }

    /// Read what is available and hand complete messages to `dispatch`.
    ///
    /// `dispatch` returns whether the message was handled. An unhandled
    /// message stays current and stops processing for this pass; it is
    /// offered again on the next call.
    pub fn handle_inbound<F>(&mut self, mut dispatch: F) -> Result<PeerStatus, DapError>
    where
        F: FnMut(&str) -> bool,
    {
        let closed = self.fill_inbound()?;

        while let Some(message) = self.framer.poll_message()? {
            if !dispatch(&message) {
                break;
            }
            self.framer.consume();
        }

        if closed {
            return Err(DapError::ConnectionClosed);
        }
        Ok(if self.framer.has_partial() {
            PeerStatus::WouldBlock
        } else {
            PeerStatus::Ok
        })
    }

    /// Write queued messages until the stream would block.
    ///
    /// A partially written message is finished first; bytes already sent
    /// are never sent again.
    pub fn handle_outbound(&mut self) -> Result<PeerStatus, DapError> {
        loop {
            if let Some(pending) = &mut self.pending_write {
                while pending.offset < pending.bytes.len() {
                    match self.stream.write(&pending.bytes[pending.offset..]) {
                        Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero).into()),
                        Ok(n) => pending.offset += n,
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            return Ok(PeerStatus::WouldBlock)
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                self.pending_write = None;
            }

            let Some(mut message) = self.outbound.pop_front() else {
                break;
            };
            if let Some(obj) = message.as_object_mut() {
                if obj.get("seq").map_or(true, serde_json::Value::is_null) {
                    self.seq += 1;
                    obj.insert("seq".into(), self.seq.into());
                }
            }
            match encode_message(&message) {
                Ok(bytes) => self.pending_write = Some(PendingWrite { bytes, offset: 0 }),
                Err(e) => {
                    tracing::error!(peer = %self.id, error = %e, "dropping unencodable message")
                }
            }
        }

        match self.stream.flush() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => Err(e.into()),
            _ => Ok(PeerStatus::Ok),
        }
    }

    /// Drain readable bytes into the framer. Returns true on EOF.
    fn fill_inbound(&mut self) -> Result<bool, DapError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let room = self.framer.read_room();
            if room == 0 {
                return Ok(false);
            }
            let want = room.min(READ_CHUNK);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => return Ok(true),
                Ok(n) => self.framer.push(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
