//! DAP server error types.

use thiserror::Error;

/// Errors raised by the protocol engine.
///
/// Only [`DapError::Io`] with [`std::io::ErrorKind::WouldBlock`] is ever
/// treated as transient; callers map it to a retry on the next poll before
/// it reaches this type.
#[derive(Debug, Error)]
pub enum DapError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client closed its end of the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A header or body grew past the configured buffer size.
    #[error("{what} too big (limit is {limit} bytes)")]
    BufferOverflow {
        /// Which part of the message overflowed ("header" or "content").
        what: &'static str,
        /// The configured maximum buffer size.
        limit: usize,
    },

    /// The header block did not carry a usable `Content-Length`.
    #[error("invalid message header: {0}")]
    InvalidHeader(String),

    /// A new client arrived while the server was full.
    #[error("max client limit reached ({max})")]
    TooManyClients {
        /// The configured client limit.
        max: usize,
    },

    /// Session bookkeeping was asked to do something impossible.
    #[error("session state inconsistency: {0}")]
    Consistency(String),

    /// The listening socket could not be opened.
    #[error("failed to listen on {address}: {source}")]
    Bind {
        /// `ip:port` the server tried to bind.
        address: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_io_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err = DapError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_buffer_overflow_display() {
        let err = DapError::BufferOverflow {
            what: "header",
            limit: 1024,
        };
        assert_eq!(err.to_string(), "header too big (limit is 1024 bytes)");
    }

    #[test]
    fn error_too_many_clients_display() {
        let err = DapError::TooManyClients { max: 8 };
        assert_eq!(err.to_string(), "max client limit reached (8)");
    }

    #[test]
    fn error_consistency_display() {
        let err = DapError::Consistency("no current frame".into());
        assert_eq!(
            err.to_string(),
            "session state inconsistency: no current frame"
        );
    }

    #[test]
    fn error_bind_display() {
        let err = DapError::Bind {
            address: "127.0.0.1:6006".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:6006"));
        assert!(err.to_string().contains("in use"));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::WouldBlock, "later");
        let err: DapError = io_err.into();
        assert!(matches!(err, DapError::Io(ref e) if e.kind() == std::io::ErrorKind::WouldBlock));
    }
}
