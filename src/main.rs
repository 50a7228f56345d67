// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entry point: CLI parsing, config loading, logging setup, and the axum
//! server lifecycle, mirroring `hdds-discovery-server::main`'s shape.

mod config;
mod error;
mod gateway;
mod net;
mod partition;
mod signing;
mod time;
mod wire;

use clap::Parser;
use config::{Config, LogLevel};
use gateway::{build_router, AppState};
use partition::PartitionDirectory;
use signing::SigningKeyStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "coral-discovery", about = "Mesh discovery service")]
struct Args {
    /// Path to a JSON config file. Overrides environment-derived defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

fn init_tracing(level: LogLevel) {
    let filter = match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Silent => LevelFilter::OFF,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter.to_string()))
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate()?;

    init_tracing(config.log_level);

    info!(
        environment = %config.environment,
        version = %config.service_version,
        bind_addr = %config.bind_addr,
        data_dir = %config.data_dir,
        "starting coral-discovery"
    );

    let signing = match &config.signing_key {
        Some(key_json) => {
            let store = SigningKeyStore::from_config(key_json, config.previous_keys.as_deref())?;
            info!("bootstrap token signing key loaded");
            Some(Arc::new(store))
        }
        None => {
            info!("no DISCOVERY_SIGNING_KEY configured; CreateBootstrapToken and JWKS will return internal errors");
            None
        }
    };

    let directory = PartitionDirectory::new(
        PathBuf::from(&config.data_dir),
        config.default_ttl(),
        config.cleanup_interval(),
        config.service_version.clone(),
    )?;

    let config = Arc::new(config);
    let state = Arc::new(AppState {
        directory,
        signing,
        config: Arc::clone(&config),
        started_at: Instant::now(),
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
