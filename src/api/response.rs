// Control API response helpers

use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type ApiResponse = Response<Full<Bytes>>;

const ENDPOINTS: &str = r#"["GET /v1/status","POST /v1/start","POST /v1/stop","GET /v1/connections","DELETE /v1/connections/{id}","GET /v1/events"]"#;

/// Build JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> ApiResponse {
    let json = match serde_json::to_string_pretty(body) {
        Ok(j) => j,
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            return raw_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Internal server error"}"#.to_string(),
            );
        }
    };
    raw_json(status, json)
}

fn raw_json(status: StatusCode, body: String) -> ApiResponse {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build response: {e}"));
            Response::new(Full::new(Bytes::from("Error")))
        })
}

/// Error body shared by every non-2xx answer
pub fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    let body = serde_json::json!({
        "error": {
            "code": status.as_u16(),
            "message": message
        }
    });
    raw_json(status, body.to_string())
}

/// 404 Not Found response
pub fn not_found() -> ApiResponse {
    raw_json(
        StatusCode::NOT_FOUND,
        format!(r#"{{"error":"Not Found","available_endpoints":{ENDPOINTS}}}"#),
    )
}

/// 400 Bad Request response
pub fn bad_request(message: &str) -> ApiResponse {
    error_response(StatusCode::BAD_REQUEST, message)
}
