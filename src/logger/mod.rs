//! Logger module
//!
//! Provides logging utilities for the socket server including:
//! - Server lifecycle logging
//! - Connection and backpressure logging
//! - Error and warning logging with a runtime level filter
//! - File-based logging support

mod format;
pub mod writer;

pub use format::{LineFormat, LogRecord};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::Config;

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static JSON_LINES: AtomicBool = AtomicBool::new(false);

/// Log severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Unknown names map to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "debug" | "trace" => Self::Debug,
            _ => Self::Info,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    set_level(Level::parse(&config.logging.level));
    JSON_LINES.store(
        LineFormat::parse(&config.logging.format) == LineFormat::Json,
        Ordering::Relaxed,
    );
    writer::init(
        config.logging.log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

pub fn set_level(level: Level) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level <= Level::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

fn line_format() -> LineFormat {
    if JSON_LINES.load(Ordering::Relaxed) {
        LineFormat::Json
    } else {
        LineFormat::Text
    }
}

fn write(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }
    let line = LogRecord::new(level, message).format(line_format());
    let to_error = level <= Level::Warn;
    match writer::get() {
        Some(w) if to_error => w.write_error(&line),
        Some(w) => w.write_info(&line),
        None if to_error => eprintln!("{line}"),
        None => println!("{line}"),
    }
}

pub fn log_error(message: &str) {
    write(Level::Error, message);
}

pub fn log_warning(message: &str) {
    write(Level::Warn, message);
}

pub fn log_info(message: &str) {
    write(Level::Info, message);
}

pub fn log_debug(message: &str) {
    write(Level::Debug, message);
}

pub fn log_config_summary(config: &Config) {
    log_info("======================================");
    log_info(&format!(
        "Endpoint: {}:{} (prefer IPv4: {}, backlog: {})",
        config.server.host, config.server.port, config.server.prefer_ipv4, config.server.backlog
    ));
    log_info(&format!(
        "Max connections: {}, buffer size: {} bytes",
        config.performance.max_connections, config.performance.buffer_size
    ));
    log_info(&format!(
        "Timeouts: send {}s, receive {}s, admission {}ms",
        config.performance.send_timeout,
        config.performance.receive_timeout,
        config.performance.admission_timeout_ms
    ));
    if let Some(workers) = config.server.workers {
        log_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.log_file {
        log_info(&format!("Log file: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        log_info(&format!("Error log: {path}"));
    }
    log_info("======================================");
}

pub fn log_server_started(addr: &SocketAddr) {
    log_info(&format!("[Server] Listening on {addr}"));
}

pub fn log_server_stopped() {
    log_info("[Server] Stopped, listener released");
}

pub fn log_bind_failed(addr: &SocketAddr, err: &impl std::fmt::Display) {
    log_error(&format!("[Server] Failed to bind {addr}: {err}"));
}

pub fn log_connection_accepted(id: impl std::fmt::Display, peer: &SocketAddr) {
    log_info(&format!("[Connection] {id} accepted from {peer}"));
}

pub fn log_connection_rejected(peer: &SocketAddr, capacity: usize) {
    log_warning(&format!(
        "[Connection] Max connections reached ({capacity}). Rejected {peer}"
    ));
}

pub fn log_connection_closed(id: impl std::fmt::Display, err: Option<&impl std::fmt::Display>) {
    match err {
        Some(e) => log_info(&format!("[Connection] {id} closed: {e}")),
        None => log_info(&format!("[Connection] {id} closed")),
    }
}

pub fn log_control_request(method: &str, path: &str, status: u16) {
    log_info(&format!("[Control] {method} {path} - {status}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_parse() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Info < Level::Debug);
        assert_eq!(Level::parse("WARNING"), Level::Warn);
        assert_eq!(Level::parse("verbose"), Level::Info);
        assert_eq!(Level::from_u8(Level::Debug as u8), Level::Debug);
    }
}
