// Listener module
// Creates the listening socket and applies per-socket options

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Socket tuning applied to the listener and inherited by accepted sockets
#[derive(Debug, Clone, Copy)]
pub struct SocketTuning {
    pub buffer_size: usize,
    pub send_timeout: Duration,
    pub receive_timeout: Option<Duration>,
}

/// Create a `TcpListener` bound to `addr` with `SO_REUSEADDR` enabled.
///
/// Send/receive buffer sizes and timeouts are set on the listening socket
/// before `bind`, then the socket starts listening with `backlog`.
///
/// # Returns
///
/// * `Ok(TcpListener)` - Successfully created and bound listener
/// * `Err(std::io::Error)` - Failed to create, configure or bind socket
pub fn create_listener(
    addr: SocketAddr,
    backlog: i32,
    tuning: &SocketTuning,
) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Allows rebinding a port still in TIME_WAIT after a stop/start round trip
    socket.set_reuse_address(true)?;
    socket.set_send_buffer_size(tuning.buffer_size)?;
    socket.set_recv_buffer_size(tuning.buffer_size)?;
    socket.set_write_timeout(non_zero(tuning.send_timeout))?;
    socket.set_read_timeout(tuning.receive_timeout.and_then(non_zero))?;

    // Set non-blocking mode for async compatibility
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    // Convert socket2::Socket to std::net::TcpListener, then to tokio::net::TcpListener
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Apply buffer sizes to an accepted connection and disable Nagle
pub fn tune_stream(stream: &TcpStream, tuning: &SocketTuning) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock = SockRef::from(stream);
    sock.set_send_buffer_size(tuning.buffer_size)?;
    sock.set_recv_buffer_size(tuning.buffer_size)?;
    Ok(())
}

// A zero timeout is rejected by setsockopt; treat it as "no timeout"
fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}
