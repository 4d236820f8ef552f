// Error module
// Error taxonomy shared by the engine, the control API and the binary

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::server::ConnectionId;

/// Every failure the engine can surface, either as a return value or
/// through an `Error`/`ConnectionStateChanged` event.
///
/// I/O causes are shared behind `Arc` so one failure can be handed to the
/// caller and to every observer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// No address resolved for the requested host and port
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },

    /// Socket creation, bind or listen failed
    #[error("failed to bind/listen on {addr}: {source}")]
    BindListen {
        addr: SocketAddr,
        #[source]
        source: Arc<io::Error>,
    },

    /// Non-abort failure reported by the accept loop
    #[error("accept failed: {0}")]
    Accept(#[source] Arc<io::Error>),

    /// No admission slot became free within the wait window
    #[error("no free connection slot within {waited_ms}ms (capacity {capacity})")]
    AdmissionTimeout { capacity: usize, waited_ms: u64 },

    /// Identifier already present in the registry
    #[error("connection {0} is already registered")]
    RegistrationConflict(ConnectionId),

    /// Read or write failure on an active connection
    #[error("I/O error on connection {id}: {source}")]
    ConnectionIo {
        id: ConnectionId,
        #[source]
        source: Arc<io::Error>,
    },

    /// Failure while tearing down during stop
    #[error("stop: {0}")]
    Stop(String),

    #[error("server is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} is closing")]
    ConnectionClosed(ConnectionId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServerError {
    pub fn connection_io(id: ConnectionId, source: io::Error) -> Self {
        Self::ConnectionIo {
            id,
            source: Arc::new(source),
        }
    }

    /// Underlying OS error kind, when there is one
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::BindListen { source, .. } | Self::ConnectionIo { source, .. } => {
                Some(source.kind())
            }
            Self::Accept(source) => Some(source.kind()),
            _ => None,
        }
    }

    /// Short, stable name used in logs and the event history
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::BindListen { .. } => "bind_listen",
            Self::Accept(_) => "accept",
            Self::AdmissionTimeout { .. } => "admission_timeout",
            Self::RegistrationConflict(_) => "registration_conflict",
            Self::ConnectionIo { .. } => "connection_io",
            Self::Stop(_) => "stop",
            Self::AlreadyRunning(_) => "already_running",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::ConnectionClosed(_) => "connection_closed",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Where an `Error` event originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    Resolve,
    Start,
    Accept,
    Registration,
    Stop,
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Start => "start",
            Self::Accept => "accept",
            Self::Registration => "registration",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::AdmissionTimeout {
            capacity: 2,
            waited_ms: 3000,
        };
        assert_eq!(
            err.to_string(),
            "no free connection slot within 3000ms (capacity 2)"
        );
        assert_eq!(err.kind(), "admission_timeout");

        let err = ServerError::RegistrationConflict(ConnectionId::new(7));
        assert_eq!(err.to_string(), "connection #7 is already registered");
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = ServerError::connection_io(
            ConnectionId::new(1),
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe"),
        );
        assert!(err.source().is_some());
        assert_eq!(err.io_kind(), Some(io::ErrorKind::BrokenPipe));
        assert_eq!(err.clone().to_string(), err.to_string());
        assert_eq!(ErrorContext::Registration.to_string(), "registration");
    }
}
