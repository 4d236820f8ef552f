// Control API handlers

use hyper::StatusCode;

use super::response::{bad_request, error_response, json_response, ApiResponse};
use super::types::{
    ConnectionsResponse, EventsResponse, StartResponse, StatusResponse, StopResponse,
};
use super::ControlState;
use crate::error::ServerError;
use crate::server::{ConnectionId, StartOutcome};

pub fn handle_status(state: &ControlState) -> ApiResponse {
    let server = &state.server;
    let status = StatusResponse {
        state: server.state(),
        endpoint: server.local_addr(),
        capacity: server.capacity(),
        available: server.available_slots(),
        connections: server.connection_count(),
        pooled_tokens: server.pooled_tokens(),
    };
    json_response(StatusCode::OK, &status)
}

/// Start on the configured endpoint; 409 carries the running endpoint
pub async fn handle_start(state: &ControlState) -> ApiResponse {
    let params = &state.endpoint;

    match state
        .server
        .try_start(&params.host, params.port, params.prefer_ipv4, params.backlog)
        .await
    {
        Ok(StartOutcome::AlreadyRunning(endpoint)) => json_response(
            StatusCode::CONFLICT,
            &StartResponse {
                status: "already_running",
                endpoint,
            },
        ),
        Ok(StartOutcome::Started(endpoint)) => json_response(
            StatusCode::OK,
            &StartResponse {
                status: "started",
                endpoint,
            },
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub async fn handle_stop(state: &ControlState) -> ApiResponse {
    state.server.stop().await;
    json_response(
        StatusCode::OK,
        &StopResponse {
            state: state.server.state(),
        },
    )
}

pub fn handle_connections(state: &ControlState) -> ApiResponse {
    let connections = state.server.connections();
    json_response(
        StatusCode::OK,
        &ConnectionsResponse {
            count: connections.len(),
            connections,
        },
    )
}

pub fn handle_disconnect(state: &ControlState, raw_id: &str) -> ApiResponse {
    let Ok(id) = raw_id.parse::<ConnectionId>() else {
        return bad_request(&format!("invalid connection id: {raw_id}"));
    };
    match state.server.disconnect(id) {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "id": id, "status": "closing" }),
        ),
        Err(e @ ServerError::UnknownConnection(_)) => {
            error_response(StatusCode::NOT_FOUND, &e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub fn handle_events(state: &ControlState) -> ApiResponse {
    let events = state.events.records();
    json_response(
        StatusCode::OK,
        &EventsResponse {
            count: events.len(),
            events,
        },
    )
}
