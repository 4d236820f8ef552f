// Server module entry
// Listener lifecycle (Idle -> Listening -> Stopping -> Idle) and the shared
// state used by the accept loop and the per-connection drivers

mod accept;
mod admission;
mod connection;
mod listener;
mod pool;
mod registry;
mod resolver;
pub mod signal;


pub use admission::{AdmissionController, AdmissionPermit};
pub use listener::{create_listener, SocketTuning};
pub use pool::{ConnectionToken, TokenPool};
pub use registry::{Connection, ConnectionId, ConnectionInfo, ConnectionState, Registry};
pub use resolver::resolve_endpoint;

use bytes::Bytes;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ErrorContext, ServerError};
use crate::logger;
use crate::observer::{Observer, ObserverSet, ServerEvent};

/// Default `listen()` backlog
pub const DEFAULT_BACKLOG: i32 = 200;

/// Upper bound on how long stop waits for one connection to finish cleanup
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Engine settings fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub max_connections: usize,
    /// Socket buffer size and per-connection receive buffer size
    pub buffer_size: usize,
    /// A pending send making no progress for this long drops the connection
    pub send_timeout: Duration,
    /// Idle receive limit, `None` to wait forever
    pub receive_timeout: Option<Duration>,
    /// How long an accepted connection waits for an admission slot
    pub admission_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            buffer_size: 4096,
            send_timeout: Duration::from_secs(30),
            receive_timeout: None,
            admission_timeout: Duration::from_secs(3),
        }
    }
}

/// Listener state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ServerState {
    Idle = 0,
    Listening = 1,
    Stopping = 2,
}

impl ServerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Listening,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Parameters of the last successful `start`, reused by `restart`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartParams {
    pub host: String,
    pub port: u16,
    pub prefer_ipv4: bool,
    pub backlog: i32,
}

/// Result of a successful [`Server::try_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This call bound a new listener
    Started(SocketAddr),
    /// A listener was already running; nothing changed
    AlreadyRunning(SocketAddr),
}

impl StartOutcome {
    pub const fn local_addr(self) -> SocketAddr {
        match self {
            Self::Started(addr) | Self::AlreadyRunning(addr) => addr,
        }
    }
}

/// State shared between the controller, the accept loop and every driver
pub(crate) struct Shared {
    pub options: ServerOptions,
    pub tuning: SocketTuning,
    pub registry: Registry,
    pub pool: TokenPool,
    pub admission: AdmissionController,
    pub observers: ObserverSet,
    state: AtomicU8,
    next_id: AtomicU64,
}

impl Shared {
    fn new(options: ServerOptions) -> Self {
        let tuning = SocketTuning {
            buffer_size: options.buffer_size,
            send_timeout: options.send_timeout,
            receive_timeout: options.receive_timeout,
        };
        Self {
            tuning,
            registry: Registry::new(),
            pool: TokenPool::new(options.buffer_size, options.max_connections),
            admission: AdmissionController::new(options.max_connections),
            observers: ObserverSet::new(),
            state: AtomicU8::new(ServerState::Idle as u8),
            next_id: AtomicU64::new(1),
            options,
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn notify(&self, event: &ServerEvent) {
        self.observers.notify(event);
    }
}

/// The running listener: its address, its stop signal and the accept task
struct ListenerHandle {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// TCP server engine.
///
/// `start` binds and begins accepting; `stop` closes every connection, then
/// the listener. Both may be called repeatedly and from several tasks.
pub struct Server {
    shared: Arc<Shared>,
    // Also serializes start/stop
    listener: Mutex<Option<ListenerHandle>>,
    endpoint: parking_lot::Mutex<Option<SocketAddr>>,
    last_start: parking_lot::Mutex<Option<StartParams>>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            shared: Arc::new(Shared::new(options)),
            listener: Mutex::new(None),
            endpoint: parking_lot::Mutex::new(None),
            last_start: parking_lot::Mutex::new(None),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.shared.observers.subscribe(observer);
    }

    /// Bind and start accepting.
    ///
    /// When already listening, the current endpoint is returned and an
    /// `AlreadyRunning` error event is raised; the listener is left alone.
    /// Any other failure rolls back to `Idle` and is returned.
    pub async fn start(
        &self,
        host: &str,
        port: u16,
        prefer_ipv4: bool,
        backlog: i32,
    ) -> Result<SocketAddr, ServerError> {
        self.try_start(host, port, prefer_ipv4, backlog)
            .await
            .map(StartOutcome::local_addr)
    }

    /// `start`, also telling whether this call bound the listener. Decided
    /// under the start/stop lock.
    pub async fn try_start(
        &self,
        host: &str,
        port: u16,
        prefer_ipv4: bool,
        backlog: i32,
    ) -> Result<StartOutcome, ServerError> {
        let mut slot = self.listener.lock().await;

        if let Some(handle) = slot.as_ref() {
            let addr = handle.local_addr;
            self.shared.notify(&ServerEvent::error(
                ErrorContext::Start,
                ServerError::AlreadyRunning(addr),
            ));
            return Ok(StartOutcome::AlreadyRunning(addr));
        }

        let (listener, local_addr) = match self.bind(host, port, prefer_ipv4, backlog).await {
            Ok(bound) => bound,
            Err((context, e)) => {
                self.shared.notify(&ServerEvent::error(context, e.clone()));
                // The socket is dropped with the error, so rolling back is a state reset
                self.shared.set_state(ServerState::Idle);
                return Err(e);
            }
        };

        let (stop, stop_rx) = watch::channel(false);
        self.shared.set_state(ServerState::Listening);
        let task = tokio::spawn(accept::run(Arc::clone(&self.shared), listener, stop_rx));

        *slot = Some(ListenerHandle {
            local_addr,
            stop,
            task,
        });
        *self.endpoint.lock() = Some(local_addr);
        *self.last_start.lock() = Some(StartParams {
            host: host.to_string(),
            port,
            prefer_ipv4,
            backlog,
        });

        logger::log_server_started(&local_addr);
        self.shared
            .notify(&ServerEvent::ServerStateChanged { listening: true });
        Ok(StartOutcome::Started(local_addr))
    }

    /// `start` with the default address family preference and backlog
    pub async fn start_default(&self, host: &str, port: u16) -> Result<SocketAddr, ServerError> {
        self.start(host, port, true, DEFAULT_BACKLOG).await
    }

    async fn bind(
        &self,
        host: &str,
        port: u16,
        prefer_ipv4: bool,
        backlog: i32,
    ) -> Result<(tokio::net::TcpListener, SocketAddr), (ErrorContext, ServerError)> {
        let addr = resolve_endpoint(host, port, prefer_ipv4)
            .await
            .map_err(|e| (ErrorContext::Resolve, e))?;

        create_listener(addr, backlog, &self.shared.tuning)
            .and_then(|l| {
                let local_addr = l.local_addr()?;
                Ok((l, local_addr))
            })
            .map_err(|e| {
                logger::log_bind_failed(&addr, &e);
                (
                    ErrorContext::Start,
                    ServerError::BindListen {
                        addr,
                        source: Arc::new(e),
                    },
                )
            })
    }

    /// Close every connection, then release the listener.
    ///
    /// No-op unless listening. Returns once all connections have finished
    /// cleanup and the accept loop has exited.
    pub async fn stop(&self) {
        let mut slot = self.listener.lock().await;
        let Some(handle) = slot.as_mut() else {
            return;
        };

        self.shared.set_state(ServerState::Stopping);

        // Connections first, so nothing accepted now outlives the registry sweep
        self.close_all().await;

        handle.stop.send_replace(true);
        if let Err(e) = (&mut handle.task).await {
            self.shared.notify(&ServerEvent::error(
                ErrorContext::Stop,
                ServerError::Stop(format!("accept loop ended abnormally: {e}")),
            ));
        }

        // Anything registered while the first sweep ran
        self.close_all().await;

        self.shared.set_state(ServerState::Idle);
        *self.endpoint.lock() = None;
        logger::log_server_stopped();
        self.shared
            .notify(&ServerEvent::ServerStateChanged { listening: false });

        *slot = None;
    }

    /// Stop, then start again with the parameters of the last successful start
    pub async fn restart(&self) -> Result<SocketAddr, ServerError> {
        let params = self.last_start.lock().clone().ok_or_else(|| {
            ServerError::InvalidConfig("restart requested before any start".to_string())
        })?;
        self.stop().await;
        self.start(&params.host, params.port, params.prefer_ipv4, params.backlog)
            .await
    }

    async fn close_all(&self) {
        let connections = self.shared.registry.snapshot();
        for conn in &connections {
            conn.close();
        }
        for conn in &connections {
            if tokio::time::timeout(CLOSE_GRACE, conn.wait_closed())
                .await
                .is_err()
            {
                self.shared.notify(&ServerEvent::error(
                    ErrorContext::Stop,
                    ServerError::Stop(format!(
                        "connection {} did not close within {}s",
                        conn.id(),
                        CLOSE_GRACE.as_secs()
                    )),
                ));
            }
        }
    }

    /// Queue bytes to be written to connection `id`
    pub fn send(&self, id: ConnectionId, data: impl Into<Bytes>) -> Result<(), ServerError> {
        self.shared
            .registry
            .get(id)
            .ok_or(ServerError::UnknownConnection(id))?
            .send(data.into())
    }

    /// Request a clean close of connection `id`
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), ServerError> {
        let conn = self
            .shared
            .registry
            .get(id)
            .ok_or(ServerError::UnknownConnection(id))?;
        conn.close();
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    /// Bound endpoint while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.endpoint.lock()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<ConnectionInfo> = self
            .shared
            .registry
            .snapshot()
            .iter()
            .map(|c| ConnectionInfo::from(c.as_ref()))
            .collect();
        list.sort_by_key(|c| c.id);
        list
    }

    pub fn available_slots(&self) -> usize {
        self.shared.admission.available()
    }

    pub fn capacity(&self) -> usize {
        self.shared.admission.capacity()
    }

    pub fn options(&self) -> &ServerOptions {
        &self.shared.options
    }

    /// Idle tokens held by the pool
    pub fn pooled_tokens(&self) -> usize {
        self.shared.pool.idle()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.stop.send_replace(true);
        }
        for conn in self.shared.registry.snapshot() {
            conn.close();
        }
    }
}
