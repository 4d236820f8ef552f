//! Observer module
//!
//! Event payloads emitted by the server and the subscriber interface used
//! to receive them. Observers are called synchronously from the task that
//! produced the event, so implementations should be quick and non-blocking.

mod event_log;
mod logging;

pub use event_log::{EventLog, EventRecord};
pub use logging::LoggingObserver;

use bytes::Bytes;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{ErrorContext, ServerError};
use crate::server::ConnectionId;

/// Something that happened inside the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The listener started (`true`) or was released (`false`)
    ServerStateChanged { listening: bool },
    /// A connection was registered, rejected or closed
    ConnectionStateChanged {
        id: ConnectionId,
        peer: SocketAddr,
        connected: bool,
        error: Option<ServerError>,
    },
    /// Raw, unframed bytes read from a connection
    DataReceived { id: ConnectionId, data: Bytes },
    /// Asynchronous failure not tied to a single connection's I/O
    Error {
        context: ErrorContext,
        error: ServerError,
    },
}

impl ServerEvent {
    pub(crate) fn error(context: ErrorContext, error: ServerError) -> Self {
        Self::Error { context, error }
    }
}

/// Receives server events
pub trait Observer: Send + Sync {
    fn notify(&self, event: &ServerEvent);
}

impl<F> Observer for F
where
    F: Fn(&ServerEvent) + Send + Sync,
{
    fn notify(&self, event: &ServerEvent) {
        self(event);
    }
}

/// Fan-out list of observers
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn notify(&self, event: &ServerEvent) {
        // Clone the list so an observer may subscribe from inside a callback
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.notify(event);
        }
    }
}
