// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
    pub control: ControlConfig,
}

/// Listening endpoint configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Hostname or literal IP address to listen on
    pub host: String,
    pub port: u16,
    /// Pick an IPv4 address when the host resolves to both families
    pub prefer_ipv4: bool,
    /// Pending-connection queue depth handed to `listen()`
    pub backlog: i32,
    /// Tokio worker threads (defaults to CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Connection limits, timeouts and buffer sizing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PerformanceConfig {
    pub max_connections: usize,
    /// Seconds a pending send may make no progress before the connection is dropped
    pub send_timeout: u64,
    /// Seconds without inbound data before the connection is dropped (0 disables)
    pub receive_timeout: u64,
    /// Size in bytes of socket buffers and of each per-connection receive buffer
    pub buffer_size: usize,
    /// How long an accepted connection may wait for a free slot
    pub admission_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    /// Line format: `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Info log file path (optional, stdout if not set)
    #[serde(default)]
    pub log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
    /// Log a line for every received chunk
    #[serde(default)]
    pub log_data: bool,
}

#[allow(clippy::missing_const_for_fn)]
fn default_log_format() -> String {
    "text".to_string()
}

/// Control API configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Number of events retained for `GET /v1/events`
    pub event_history: usize,
}
