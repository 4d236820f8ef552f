use std::sync::Arc;

use rust_sockserver::api::{self, ControlState};
use rust_sockserver::config::Config;
use rust_sockserver::logger;
use rust_sockserver::observer::{EventLog, LoggingObserver, Observer};
use rust_sockserver::server::signal::{start_signal_handler, SignalHandler};
use rust_sockserver::server::{create_listener, Server, SocketTuning, StartParams};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Runtime sized from server.workers, CPU cores otherwise
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    logger::log_config_summary(&cfg);

    let options = cfg.server_options()?;
    let server = Arc::new(Server::new(options.clone()));
    let events = Arc::new(EventLog::new(cfg.control.event_history));
    server.subscribe(Arc::new(LoggingObserver::new(cfg.logging.log_data)));
    server.subscribe(Arc::clone(&events) as Arc<dyn Observer>);

    let endpoint = StartParams {
        host: cfg.server.host.clone(),
        port: cfg.server.port,
        prefer_ipv4: cfg.server.prefer_ipv4,
        backlog: cfg.server.backlog,
    };
    server
        .start(
            &endpoint.host,
            endpoint.port,
            endpoint.prefer_ipv4,
            endpoint.backlog,
        )
        .await?;

    if cfg.control.enabled {
        let control_addr = cfg.get_control_socket_addr()?;
        let tuning = SocketTuning {
            buffer_size: options.buffer_size,
            send_timeout: options.send_timeout,
            receive_timeout: None,
        };
        let listener = create_listener(control_addr, cfg.server.backlog, &tuning)?;
        let state = Arc::new(ControlState {
            server: Arc::clone(&server),
            events,
            endpoint,
        });
        tokio::spawn(api::run_control_server(listener, state));
    }

    let signals = Arc::new(SignalHandler::new());
    start_signal_handler(Arc::clone(&signals), Arc::clone(&server))?;

    signals.wait_for_shutdown().await;
    server.stop().await;
    logger::log_info("[Server] Shutdown complete");
    Ok(())
}
