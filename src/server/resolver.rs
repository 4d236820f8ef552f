// Endpoint resolver module
// Turns a host name or literal address into one bindable endpoint

use std::net::{IpAddr, SocketAddr};

use crate::error::ServerError;

/// Resolve `host:port` into a single endpoint.
///
/// Literal addresses are used as-is. Host names are looked up and, when both
/// families come back, the first address of the preferred family is picked.
/// If the preferred family is missing, the first candidate is used.
pub async fn resolve_endpoint(
    host: &str,
    port: u16,
    prefer_ipv4: bool,
) -> Result<SocketAddr, ServerError> {
    // Bracketed IPv6 literals ("[::1]") are accepted too
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ServerError::Resolution {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?
        .collect();

    select_preferred(&candidates, prefer_ipv4).ok_or_else(|| ServerError::Resolution {
        host: host.to_string(),
        port,
        reason: "no addresses found".to_string(),
    })
}

fn select_preferred(candidates: &[SocketAddr], prefer_ipv4: bool) -> Option<SocketAddr> {
    candidates
        .iter()
        .find(|addr| addr.is_ipv4() == prefer_ipv4)
        .or_else(|| candidates.first())
        .copied()
}
