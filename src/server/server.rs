//! The supervisor daemon binary: parses arguments, loads the config,
//! builds the [`Registry`], autostarts declared programs, spawns the
//! [`MonitorHandle`], and accepts client connections over the wire
//! protocol. `SIGINT`/`SIGHUP` drive shutdown/reload (SPEC_FULL.md §5, §6).

use std::time::Duration;

use client_handler::ClientHandler;
use process::monitor::MonitorHandle;
use process::registry::Registry;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};

mod args;
mod client_handler;
mod config;
mod logging;
mod process;

#[tokio::main]
async fn main() {
    let args = args::Args::parse_args();
    logging::init(args.loglevel);

    tracing::info!(config = %args.config.display(), "starting taskmaster daemon");

    let config = match config::Config::load(&args.config) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration, exiting");
            std::process::exit(1);
        }
    };

    let registry = Registry::new(args.config.clone());
    registry.load(config, args.config.clone()).await;
    registry.autostart().await;

    let listener = match TcpListener::bind(tcl::SOCKET_ADDRESS).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, address = tcl::SOCKET_ADDRESS, "failed to bind listener, exiting");
            std::process::exit(1);
        }
    };
    tracing::info!(address = tcl::SOCKET_ADDRESS, "listening for clients");

    let mut monitor = Some(MonitorHandle::spawn(registry.clone()));

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut shutting_down = false;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        tracing::info!(%addr, "client connected");
                        tokio::spawn(ClientHandler::handle_client(socket, registry.clone()));
                    }
                    Err(error) => tracing::error!(%error, "failed to accept client"),
                }
            }

            _ = sigint.recv() => {
                // Idempotent: a second Ctrl+C while shutting down is ignored.
                if shutting_down {
                    continue;
                }
                shutting_down = true;
                tracing::info!("received SIGINT, shutting down gracefully");
                if let Some(handle) = monitor.take() {
                    if tokio::time::timeout(Duration::from_secs(3), handle.stop()).await.is_err() {
                        tracing::warn!("monitor did not stop within the 3s shutdown budget");
                    }
                }
                if tokio::time::timeout(Duration::from_secs(3), registry.shutdown()).await.is_err() {
                    tracing::warn!("registry did not shut down within the 3s budget, exiting anyway");
                }
                tracing::info!("shutdown complete");
                return;
            }

            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, reloading configuration");
                let path = registry.config_path().await;
                let structure_changed = ClientHandler::reload_from_remembered_path(&registry, &path).await;
                if structure_changed {
                    if let Some(handle) = monitor.take() {
                        monitor = Some(handle.reload(registry.clone()).await);
                    }
                }
            }
        }
    }
}
