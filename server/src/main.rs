use clap::Parser;
use std::net::TcpListener as StdTcpListener;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zaku_server::config::Config;
use zaku_server::queue::QueueEngine;
use zaku_server::state::ServerState;
use zaku_server::store::{MemoryStore, RedisStore, Store};
use zaku_server::{reaper, transport};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level()))
        .init();

    if config.free_port && StdTcpListener::bind(config.bind_addr()).is_err() {
        tracing::error!(addr = %config.bind_addr(), "port already in use, refusing to signal the holder");
        return ExitCode::FAILURE;
    }

    let store: Arc<dyn Store> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to backing store");
                return ExitCode::FAILURE;
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let queues = Arc::new(QueueEngine::new(store, config.key_prefix.clone()));
    let auth = config.auth_from_env();
    let state = ServerState::new(queues.clone(), auth);

    let listener = match TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr(), error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %config.bind_addr(), "zaku-server listening");

    let reaper_handle = reaper::spawn(queues, Duration::from_millis(250));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::select! {
        () = transport::serve(listener, state, shutdown_rx) => {}
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(true);
        }
    }
    reaper_handle.abort();
    info!("zaku-server shut down gracefully");
    ExitCode::SUCCESS
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
