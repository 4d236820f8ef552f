// Connection token pool module
// Free list of per-connection buffer bundles, reused across accepts

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::registry::{ConnectionId, ConnectionState};

/// Buffers and bookkeeping for one accepted connection.
///
/// Storage survives across connections: on release the receive buffer is
/// zeroed and the output queue emptied, but neither is deallocated.
#[derive(Debug)]
pub struct ConnectionToken {
    id: ConnectionId,
    state: ConnectionState,
    recv_buf: Vec<u8>,
    send_queue: VecDeque<Bytes>,
}

impl ConnectionToken {
    fn new(buffer_size: usize) -> Self {
        Self {
            id: ConnectionId::new(0),
            state: ConnectionState::Closed,
            recv_buf: vec![0; buffer_size],
            send_queue: VecDeque::new(),
        }
    }

    fn reset(&mut self, id: ConnectionId) {
        self.id = id;
        self.state = ConnectionState::Accepted;
        self.send_queue.clear();
    }

    fn clear(&mut self) {
        self.state = ConnectionState::Closed;
        self.recv_buf.fill(0);
        self.send_queue.clear();
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    #[cfg(test)]
    pub fn recv_buf(&mut self) -> &mut [u8] {
        &mut self.recv_buf
    }

    #[cfg(test)]
    pub fn recv_capacity(&self) -> usize {
        self.recv_buf.len()
    }

    pub fn queue_send(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.send_queue.push_back(data);
        }
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// Front chunk of the output queue
    #[cfg(test)]
    pub fn pending_send(&self) -> &[u8] {
        self.send_queue.front().map_or(&[][..], |b| &b[..])
    }

    /// Receive buffer and front send chunk, borrowed together so a receive
    /// and a send can be in flight at the same time
    pub fn io_buffers(&mut self) -> (&mut [u8], &[u8]) {
        let pending = self.send_queue.front().map_or(&[][..], |b| &b[..]);
        (&mut self.recv_buf, pending)
    }

    /// Mark `n` bytes of the front chunk as written
    pub fn advance_send(&mut self, n: usize) {
        if let Some(front) = self.send_queue.front_mut() {
            front.advance(n.min(front.len()));
            if front.is_empty() {
                self.send_queue.pop_front();
            }
        }
    }
}

/// Free list of [`ConnectionToken`]s.
///
/// At most `max_idle` tokens are retained; anything beyond that is dropped
/// on release so a burst does not pin memory forever.
#[derive(Debug)]
pub struct TokenPool {
    free: Mutex<Vec<ConnectionToken>>,
    buffer_size: usize,
    max_idle: usize,
    allocated: AtomicUsize,
}

impl TokenPool {
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            buffer_size,
            max_idle,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Take a token from the free list (or allocate one) and bind it to `id`
    pub fn acquire(&self, id: ConnectionId) -> ConnectionToken {
        let reused = self.free.lock().pop();
        let mut token = reused.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            ConnectionToken::new(self.buffer_size)
        });
        token.reset(id);
        token
    }

    /// Clear `token` and put it back on the free list
    pub fn release(&self, mut token: ConnectionToken) {
        token.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(token);
        } else {
            drop(free);
            self.allocated.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Tokens currently sitting in the free list
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Tokens alive, idle or in use
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}
