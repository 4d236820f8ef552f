// Configuration module entry point
// Loads layered configuration and converts it into engine options

mod types;

use std::net::SocketAddr;
use std::time::Duration;

pub use types::{Config, ControlConfig, LoggingConfig, PerformanceConfig, ServerConfig};

use crate::error::ServerError;
use crate::server::ServerOptions;

impl Config {
    /// Load configuration from specified file path (without extension).
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SOCKSERVER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 9000)?
            .set_default("server.prefer_ipv4", true)?
            .set_default("server.backlog", 200)?
            .set_default("performance.max_connections", 1000)?
            .set_default("performance.send_timeout", 30)?
            .set_default("performance.receive_timeout", 0)?
            .set_default("performance.buffer_size", 4096)?
            .set_default("performance.admission_timeout_ms", 3000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("logging.log_data", false)?
            .set_default("control.enabled", true)?
            .set_default("control.host", "127.0.0.1")?
            .set_default("control.port", 9001)?
            .set_default("control.event_history", 256)?
            .build()?;

        settings.try_deserialize()
    }

    /// Engine options derived from the `performance` section
    pub fn server_options(&self) -> Result<ServerOptions, ServerError> {
        let perf = &self.performance;
        if perf.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "performance.max_connections must be at least 1".to_string(),
            ));
        }
        if perf.buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "performance.buffer_size must be at least 1".to_string(),
            ));
        }
        if self.server.backlog <= 0 {
            return Err(ServerError::InvalidConfig(
                "server.backlog must be positive".to_string(),
            ));
        }

        Ok(ServerOptions {
            max_connections: perf.max_connections,
            buffer_size: perf.buffer_size,
            send_timeout: Duration::from_secs(perf.send_timeout),
            receive_timeout: (perf.receive_timeout > 0)
                .then(|| Duration::from_secs(perf.receive_timeout)),
            admission_timeout: Duration::from_millis(perf.admission_timeout_ms),
        })
    }

    pub fn get_control_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.control.host, self.control.port)
            .parse()
            .map_err(|e| format!("Invalid control address: {e}"))
    }
}
