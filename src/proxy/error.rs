//! Error types for proxy operations.
//!
//! This module defines structured error types for the accept loops:
//! - Server errors (binding, accept)
//! - Protocol errors (malformed SOCKS5 or HTTP requests)
//! - Connection errors (upstream connection, forwarding)

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind a listener.
    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    Bind {
        /// Protocol served on the listener.
        protocol: &'static str,
        /// Address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Malformed or unsupported HTTP proxy request.
    #[error("invalid proxy request: {0}")]
    InvalidRequest(String),

    /// SOCKS5 protocol violation.
    #[error("SOCKS5 protocol error: {0}")]
    Socks5(String),

    /// Failed to connect to upstream server.
    #[error("failed to connect to upstream '{addr}': {message}")]
    UpstreamConnect {
        /// The address we tried to connect to.
        addr: String,
        /// Error message.
        message: String,
    },
}

impl ProxyError {
    /// Whether this error is the peer going away rather than a real fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            ProxyError::Http(e) => e.is_incomplete_message() || e.is_canceled(),
            _ => false,
        }
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ProxyError::Bind {
            protocol: "SOCKS5",
            addr: "127.0.0.1:1080".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("SOCKS5"));
        assert!(msg.contains("127.0.0.1:1080"));
    }

    #[test]
    fn test_upstream_connect_error() {
        let err = ProxyError::UpstreamConnect {
            addr: "api.example.com:443".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("api.example.com:443"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let proxy_err: ProxyError = io_err.into();
        assert!(matches!(proxy_err, ProxyError::Io(_)));
        assert!(proxy_err.is_disconnect());
    }

    #[test]
    fn test_protocol_error_is_not_disconnect() {
        assert!(!ProxyError::Socks5("bad version".to_string()).is_disconnect());
    }
}
