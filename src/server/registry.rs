// Connection registry module
// Identity-keyed table of currently active connections

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::ServerError;

/// Opaque connection identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(Self)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Accepted = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Accepted,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Receiving ends owned by the I/O driver of a connection
pub struct DriverChannels {
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    pub close: watch::Receiver<bool>,
}

/// Registry entry for one accepted connection.
///
/// The I/O driver owns the socket and the pooled buffers; this handle is what
/// the rest of the server uses to observe, feed and close the connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Bytes>,
    close_requested: watch::Sender<bool>,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> (Arc<Self>, DriverChannels) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (close_requested, close_rx) = watch::channel(false);
        let (closed, _) = watch::channel(false);

        let conn = Arc::new(Self {
            id,
            peer,
            state: AtomicU8::new(ConnectionState::Accepted as u8),
            outbound,
            close_requested,
            closed,
        });
        let channels = DriverChannels {
            outbound: outbound_rx,
            close: close_rx,
        };
        (conn, channels)
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queue bytes for the driver to write
    pub fn send(&self, data: Bytes) -> Result<(), ServerError> {
        if matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return Err(ServerError::ConnectionClosed(self.id));
        }
        self.outbound
            .send(data)
            .map_err(|_| ServerError::ConnectionClosed(self.id))
    }

    /// Ask the driver to close the connection.
    ///
    /// Returns `false` if a close was already requested.
    pub fn close(&self) -> bool {
        !self.close_requested.send_replace(true)
    }

    /// Resolves once the driver has finished cleanup
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub(crate) fn mark_closed(&self) {
        self.set_state(ConnectionState::Closed);
        self.closed.send_replace(true);
    }
}

/// Snapshot of one registry entry, as exposed to consumers
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub state: ConnectionState,
}

impl From<&Connection> for ConnectionInfo {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id(),
            peer: conn.peer(),
            state: conn.state(),
        }
    }
}

/// Concurrency-safe map from id to active connection
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent. On conflict the rejected handle is handed back.
    pub fn insert(&self, conn: Arc<Connection>) -> Result<(), Arc<Connection>> {
        match self.entries.lock().entry(conn.id()) {
            Entry::Occupied(_) => Err(conn),
            Entry::Vacant(slot) => {
                slot.insert(conn);
                Ok(())
            }
        }
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.entries.lock().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Stable copy of every registered handle; the lock is held only for the copy
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn test_insert_conflict_returns_handle() {
        let registry = Registry::new();
        let (a, _ch_a) = Connection::new(ConnectionId::new(1), peer());
        let (b, _ch_b) = Connection::new(ConnectionId::new(1), peer());

        assert!(registry.insert(a).is_ok());
        let rejected = registry.insert(b).unwrap_err();
        assert_eq!(rejected.id(), ConnectionId::new(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_snapshot() {
        let registry = Registry::new();
        for i in 1..=3 {
            let (conn, _) = Connection::new(ConnectionId::new(i), peer());
            registry.insert(conn).unwrap();
        }

        let mut ids: Vec<_> = registry.snapshot().iter().map(|c| c.id().get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);

        assert!(registry.remove(ConnectionId::new(2)).is_some());
        assert!(registry.remove(ConnectionId::new(2)).is_none());
        assert!(registry.get(ConnectionId::new(2)).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts_keep_keys_unique() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut won = 0;
                    for i in 0..100 {
                        // Every thread races for the same 100 ids
                        let (conn, _) = Connection::new(ConnectionId::new(i), peer());
                        if registry.insert(conn).is_ok() {
                            won += 1;
                        }
                    }
                    won
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
        assert_eq!(registry.len(), 100);
    }

    #[test]
    fn test_connection_close_and_send() {
        let (conn, mut channels) = Connection::new(ConnectionId::new(9), peer());
        conn.send(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(channels.outbound.try_recv().unwrap(), Bytes::from_static(b"hi"));

        assert!(conn.close());
        assert!(!conn.close());
        assert!(*channels.close.borrow_and_update());

        conn.set_state(ConnectionState::Closing);
        assert!(matches!(
            conn.send(Bytes::from_static(b"late")),
            Err(ServerError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_closed_after_mark() {
        let (conn, _channels) = Connection::new(ConnectionId::new(3), peer());
        conn.mark_closed();
        conn.wait_closed().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_id_parse_and_display() {
        let id: ConnectionId = "#42".parse().unwrap();
        assert_eq!(id, ConnectionId::new(42));
        assert_eq!(id.to_string(), "#42");
        assert_eq!("17".parse::<ConnectionId>().unwrap().get(), 17);
    }
}
