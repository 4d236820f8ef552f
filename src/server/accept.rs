// Accept loop module
// Waits for inbound connections and routes each through admission and
// registration before handing it to its I/O driver

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::admission::AdmissionPermit;
use super::connection::spawn_driver;
use super::listener::tune_stream;
use super::registry::{Connection, ConnectionId};
use super::{ServerState, Shared};
use crate::error::{ErrorContext, ServerError};
use crate::logger;
use crate::observer::ServerEvent;

/// Pause after a failed accept so persistent errors (e.g. EMFILE) don't spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Accept until the stop signal fires; the listener is closed on return.
pub(crate) async fn run(
    shared: Arc<Shared>,
    listener: TcpListener,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            // Stop is the cancellation of the pending accept: absorbed silently
            () = stopped(&mut stop) => break,

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => admit(&shared, stream, peer, &mut stop).await,
                    Err(_) if *stop.borrow() => break,
                    Err(e) => {
                        shared.notify(&ServerEvent::error(
                            ErrorContext::Accept,
                            ServerError::Accept(Arc::new(e)),
                        ));
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    logger::log_debug("[Accept] Loop exited, listening socket closed");
}

/// Resolves once the stop signal is set; a closed channel counts as stopped
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Wait for an admission slot, then register the connection.
///
/// A connection that gets no slot within the admission timeout is closed and
/// reported as a rejected connection; no token is taken for it. A slot won
/// after stop has begun is given back and the socket closed unregistered.
async fn admit(
    shared: &Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    stop: &mut watch::Receiver<bool>,
) {
    let id = shared.next_id();

    let admitted = tokio::select! {
        biased;
        () = stopped(stop) => return,
        result = shared.admission.try_acquire(shared.options.admission_timeout) => result,
    };

    let permit = match admitted {
        Ok(permit) => permit,
        Err(e) => {
            drop(stream);
            shared.notify(&ServerEvent::ConnectionStateChanged {
                id,
                peer,
                connected: false,
                error: Some(e),
            });
            return;
        }
    };

    // Stop frees slots during its first sweep; those must not admit anyone
    if shared.state() == ServerState::Stopping {
        permit.release();
        drop(stream);
        return;
    }

    if let Err(e) = register(shared, id, stream, peer, permit) {
        shared.notify(&ServerEvent::error(ErrorContext::Registration, e));
    }
}

/// Bind a pooled token to the accepted socket, insert it into the registry
/// and start its driver.
///
/// On an id collision the token goes back to the pool, the admission slot is
/// released and the socket is closed before the conflict is returned.
pub(crate) fn register(
    shared: &Arc<Shared>,
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    permit: AdmissionPermit,
) -> Result<(), ServerError> {
    if let Err(e) = tune_stream(&stream, &shared.tuning) {
        logger::log_warning(&format!("[Accept] Failed to tune socket for {peer}: {e}"));
    }

    let token = shared.pool.acquire(id);
    let (conn, channels) = Connection::new(id, peer);

    if shared.registry.insert(Arc::clone(&conn)).is_err() {
        shared.pool.release(token);
        permit.release();
        drop(stream);
        return Err(ServerError::RegistrationConflict(id));
    }

    shared.notify(&ServerEvent::ConnectionStateChanged {
        id,
        peer,
        connected: true,
        error: None,
    });
    spawn_driver(Arc::clone(shared), conn, channels, stream, token, permit);
    Ok(())
}
