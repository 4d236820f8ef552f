// Control API module entry
// Small HTTP/1 JSON surface over a running `Server`

mod handlers;
mod response;
mod types;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::logger;
use crate::observer::EventLog;
use crate::server::{Server, StartParams};

pub use response::*;
pub use types::*;

/// Everything a control request may touch
pub struct ControlState {
    pub server: Arc<Server>,
    pub events: Arc<EventLog>,
    /// Endpoint used by `POST /v1/start`
    pub endpoint: StartParams,
}

/// API route handler
///
/// Request bodies are never read, so any body type is accepted.
pub async fn handle_control<B>(
    req: Request<B>,
    state: Arc<ControlState>,
) -> Result<ApiResponse, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/v1/status") => handlers::handle_status(&state),
        (&Method::POST, "/v1/start") => handlers::handle_start(&state).await,
        (&Method::POST, "/v1/stop") => handlers::handle_stop(&state).await,
        (&Method::GET, "/v1/connections") => handlers::handle_connections(&state),
        (&Method::GET, "/v1/events") => handlers::handle_events(&state),
        (&Method::DELETE, p) if p.starts_with("/v1/connections/") => {
            handlers::handle_disconnect(&state, &p["/v1/connections/".len()..])
        }
        _ => not_found(),
    };

    logger::log_control_request(method.as_str(), &path, response.status().as_u16());
    Ok(response)
}

/// Serve the control API on `listener` until the task is dropped
pub async fn run_control_server(listener: TcpListener, state: Arc<ControlState>) {
    if let Ok(addr) = listener.local_addr() {
        logger::log_info(&format!("[Control] API listening on http://{addr}"));
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                logger::log_error(&format!("[Control] Failed to accept connection: {e}"));
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_control(req, Arc::clone(&state)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                logger::log_debug(&format!("[Control] Connection from {peer} ended: {e}"));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{ServerOptions, DEFAULT_BACKLOG};
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn control_state() -> Arc<ControlState> {
        let server = Arc::new(Server::new(ServerOptions {
            max_connections: 4,
            ..ServerOptions::default()
        }));
        let events = Arc::new(EventLog::new(32));
        server.subscribe(Arc::clone(&events) as Arc<dyn crate::observer::Observer>);
        Arc::new(ControlState {
            server,
            events,
            endpoint: StartParams {
                host: "127.0.0.1".to_string(),
                port: 0,
                prefer_ipv4: true,
                backlog: DEFAULT_BACKLOG,
            },
        })
    }

    async fn call(
        state: &Arc<ControlState>,
        method: Method,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap();
        let resp = handle_control(req, Arc::clone(state)).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status_when_idle() {
        let state = control_state();
        let (status, body) = call(&state, Method::GET, "/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "idle");
        assert!(body["endpoint"].is_null());
        assert_eq!(body["capacity"], 4);
        assert_eq!(body["available"], 4);
    }

    #[tokio::test]
    async fn test_start_twice_conflicts() {
        let state = control_state();

        let (status, first) = call(&state, Method::POST, "/v1/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "started");

        let (status, second) = call(&state, Method::POST, "/v1/start").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(second["status"], "already_running");
        assert_eq!(second["endpoint"], first["endpoint"]);

        let (status, body) = call(&state, Method::POST, "/v1/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "idle");

        let (_, events) = call(&state, Method::GET, "/v1/events").await;
        let kinds: Vec<&str> = events["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["kind"].as_str())
            .collect();
        assert_eq!(kinds, vec!["server_started", "error", "server_stopped"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_get_one_conflict() {
        let state = control_state();

        let (a, b) = tokio::join!(
            call(&state, Method::POST, "/v1/start"),
            call(&state, Method::POST, "/v1/start")
        );
        let mut statuses = vec![a.0, b.0];
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
        assert_eq!(a.1["endpoint"], b.1["endpoint"]);

        state.server.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_errors() {
        let state = control_state();

        let (status, _) = call(&state, Method::DELETE, "/v1/connections/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, Method::DELETE, "/v1/connections/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);
    }

    #[tokio::test]
    async fn test_connections_lists_live_clients() {
        let state = control_state();
        let (_, started) = call(&state, Method::POST, "/v1/start").await;
        let addr: std::net::SocketAddr = started["endpoint"].as_str().unwrap().parse().unwrap();

        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        for _ in 0..500 {
            if state.server.connection_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, body) = call(&state, Method::GET, "/v1/connections").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        let id = body["connections"][0]["id"].as_u64().unwrap();

        let (status, _) = call(&state, Method::DELETE, &format!("/v1/connections/{id}")).await;
        assert_eq!(status, StatusCode::OK);

        state.server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = control_state();
        let (status, body) = call(&state, Method::GET, "/v1/nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["available_endpoints"].is_array());

        let (status, _) = call(&state, Method::GET, "/v1/stop").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_http_over_tcp() {
        let state = control_state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(run_control_server(listener, state));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /v1/status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut raw))
            .await
            .unwrap()
            .unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("\"state\": \"idle\""));
        server.abort();
    }
}
