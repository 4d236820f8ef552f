// Logging observer
// Forwards server events to the logger

use super::{Observer, ServerEvent};
use crate::error::ServerError;
use crate::logger;

/// Writes every event through [`crate::logger`]
pub struct LoggingObserver {
    /// Log a debug line per received chunk
    log_data: bool,
}

impl LoggingObserver {
    pub const fn new(log_data: bool) -> Self {
        Self { log_data }
    }
}

impl Observer for LoggingObserver {
    fn notify(&self, event: &ServerEvent) {
        match event {
            ServerEvent::ServerStateChanged { listening: true } => {
                logger::log_info("[Server] State: listening");
            }
            ServerEvent::ServerStateChanged { listening: false } => {
                logger::log_info("[Server] State: idle");
            }
            ServerEvent::ConnectionStateChanged {
                id,
                peer,
                connected: true,
                ..
            } => logger::log_connection_accepted(id, peer),
            ServerEvent::ConnectionStateChanged {
                id, peer, error, ..
            } => match error.as_ref() {
                Some(ServerError::AdmissionTimeout { capacity, .. }) => {
                    logger::log_connection_rejected(peer, *capacity);
                }
                other => logger::log_connection_closed(id, other),
            },
            ServerEvent::DataReceived { id, data } => {
                if self.log_data {
                    logger::log_debug(&format!("[Connection] {id} received {} bytes", data.len()));
                }
            }
            ServerEvent::Error { context, error } => {
                logger::log_error(&format!("[{context}] {error}"));
            }
        }
    }
}
