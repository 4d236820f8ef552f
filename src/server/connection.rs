// Connection driver module
// Drives receive and send for one registered connection and releases its
// resources on every exit path

use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::WriteHalf;
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::admission::AdmissionPermit;
use super::pool::ConnectionToken;
use super::registry::{Connection, ConnectionState, DriverChannels};
use super::Shared;
use crate::error::ServerError;
use crate::observer::ServerEvent;

/// Spawn the I/O task for a freshly registered connection.
///
/// The task owns the socket, the pooled token and the admission permit. When
/// it ends, cleanup runs in a fixed order: registry entry removed, admission
/// slot released, token returned to the pool, then the disconnect is reported.
pub(crate) fn spawn_driver(
    shared: Arc<Shared>,
    conn: Arc<Connection>,
    channels: DriverChannels,
    mut stream: TcpStream,
    mut token: ConnectionToken,
    permit: AdmissionPermit,
) {
    tokio::spawn(async move {
        conn.set_state(ConnectionState::Active);
        token.set_state(ConnectionState::Active);

        let reason = drive(&shared, &conn, &mut stream, &mut token, channels).await;

        conn.set_state(ConnectionState::Closing);
        token.set_state(ConnectionState::Closing);
        let _ = stream.shutdown().await;
        drop(stream);

        shared.registry.remove(conn.id());
        permit.release();
        shared.pool.release(token);

        shared.notify(&ServerEvent::ConnectionStateChanged {
            id: conn.id(),
            peer: conn.peer(),
            connected: false,
            error: reason,
        });
        conn.mark_closed();
    });
}

/// Run the receive/send loop until the peer leaves, an I/O error occurs or a
/// close is requested. Returns the failure, if any.
///
/// At most one receive and one send are in flight; each is re-armed only
/// after the previous one completed, which keeps per-connection order.
async fn drive(
    shared: &Shared,
    conn: &Connection,
    stream: &mut TcpStream,
    token: &mut ConnectionToken,
    mut channels: DriverChannels,
) -> Option<ServerError> {
    let id = conn.id();
    let idle_limit = shared.options.receive_timeout;
    let send_limit =
        (!shared.options.send_timeout.is_zero()).then_some(shared.options.send_timeout);

    let (mut reader, mut writer) = stream.split();

    let idle = tokio::time::sleep(idle_limit.unwrap_or_default());
    tokio::pin!(idle);

    let mut send_deadline: Option<Instant> = None;
    let mut outbound_open = true;

    loop {
        let (recv_buf, pending) = token.io_buffers();
        let sending = !pending.is_empty();

        tokio::select! {
            () = async {
                let _ = channels.close.wait_for(|requested| *requested).await;
            } => return None,

            result = reader.read(recv_buf) => match result {
                // Orderly shutdown by the peer
                Ok(0) => return None,
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&token.io_buffers().0[..n]);
                    shared.notify(&ServerEvent::DataReceived { id, data });
                    if let Some(limit) = idle_limit {
                        idle.as_mut().reset(Instant::now() + limit);
                    }
                }
                Err(e) => return Some(ServerError::connection_io(id, e)),
            },

            result = write_until(&mut writer, pending, send_deadline), if sending => match result {
                Ok(0) => {
                    return Some(ServerError::connection_io(
                        id,
                        io::Error::new(io::ErrorKind::WriteZero, "peer accepted no bytes"),
                    ));
                }
                Ok(n) => {
                    token.advance_send(n);
                    send_deadline = next_deadline(token.has_pending_send(), send_limit);
                }
                Err(e) => return Some(ServerError::connection_io(id, e)),
            },

            message = channels.outbound.recv(), if outbound_open => match message {
                Some(data) => {
                    let was_idle = !token.has_pending_send();
                    token.queue_send(data);
                    if was_idle {
                        send_deadline = next_deadline(token.has_pending_send(), send_limit);
                    }
                }
                None => outbound_open = false,
            },

            () = &mut idle, if idle_limit.is_some() => {
                return Some(ServerError::connection_io(
                    id,
                    io::Error::new(io::ErrorKind::TimedOut, "receive timed out"),
                ));
            }
        }
    }
}

fn next_deadline(pending: bool, limit: Option<std::time::Duration>) -> Option<Instant> {
    if pending {
        limit.map(|l| Instant::now() + l)
    } else {
        None
    }
}

/// One `write` bounded by `deadline`. Cancel-safe: nothing is written unless
/// the future completes.
async fn write_until(
    writer: &mut WriteHalf<'_>,
    buf: &[u8],
    deadline: Option<Instant>,
) -> io::Result<usize> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, writer.write(buf))
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "send timed out"))),
        None => writer.write(buf).await,
    }
}
