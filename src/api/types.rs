// Control API response bodies

use serde::Serialize;
use std::net::SocketAddr;

use crate::observer::EventRecord;
use crate::server::{ConnectionInfo, ServerState};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: ServerState,
    pub endpoint: Option<SocketAddr>,
    pub capacity: usize,
    pub available: usize,
    pub connections: usize,
    pub pooled_tokens: usize,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    /// `started` or `already_running`
    pub status: &'static str,
    pub endpoint: SocketAddr,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub state: ServerState,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub count: usize,
    pub events: Vec<EventRecord>,
}
