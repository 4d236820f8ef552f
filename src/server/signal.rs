// Signal handling module
//
// Supported signals:
// - SIGHUP:  Restart the listener (stop, then start on the same endpoint)
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::Server;
use crate::logger;

/// Signal handler state
pub struct SignalHandler {
    /// Shutdown signal (SIGTERM, SIGINT)
    pub shutdown: Arc<Notify>,
    /// Whether shutdown has been requested
    pub shutdown_requested: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(Notify::new()),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        // notify_one stores a permit if main is not waiting yet
        self.shutdown.notify_one();
    }

    /// Resolves once SIGINT/SIGTERM arrived
    pub async fn wait_for_shutdown(&self) {
        if self.shutdown_requested.load(Ordering::SeqCst) {
            return;
        }
        self.shutdown.notified().await;
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Start signal handlers (Unix only)
///
/// | Signal  | Action            |
/// |---------|-------------------|
/// | SIGHUP  | Restart listener  |
/// | SIGTERM | Graceful stop     |
/// | SIGINT  | Graceful stop     |
#[cfg(unix)]
pub fn start_signal_handler(
    handler: Arc<SignalHandler>,
    server: Arc<Server>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    logger::log_info(&format!(
        "[Signal] Handlers registered (HUP: restart, TERM/INT: shutdown), pid {}",
        std::process::id()
    ));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    logger::log_info("[Signal] SIGHUP received, restarting listener");
                    match server.restart().await {
                        Ok(addr) => {
                            logger::log_info(&format!("[Signal] Listener restarted on {addr}"));
                        }
                        Err(e) => logger::log_error(&format!("[Signal] Restart failed: {e}")),
                    }
                }

                _ = sigterm.recv() => {
                    logger::log_info("[Signal] SIGTERM received, initiating graceful shutdown");
                    handler.request_shutdown();
                    break;
                }

                _ = sigint.recv() => {
                    logger::log_info("[Signal] SIGINT received, initiating graceful shutdown");
                    handler.request_shutdown();
                    break;
                }
            }
        }
    });

    Ok(())
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(
    handler: Arc<SignalHandler>,
    _server: Arc<Server>,
) -> std::io::Result<()> {
    tokio::spawn(async move {
        logger::log_info("[Signal] Only Ctrl+C is supported on this platform");

        if let Ok(()) = tokio::signal::ctrl_c().await {
            logger::log_info("[Signal] Ctrl+C received, initiating shutdown");
            handler.request_shutdown();
        }
    });
    Ok(())
}
