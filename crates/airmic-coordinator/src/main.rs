//! airmic-coordinator: control-channel and HTTP server for airmic rooms.

use std::path::PathBuf;
use std::time::Duration;

use airmic_config::{load_config, validation, AirmicConfig};
use airmic_coordinator::{serve_http, serve_ws, ConnectionLimits, Coordinator, HttpState};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "airmic-coordinator", about = "Room coordinator for airmic live audio")]
struct Args {
    /// Config file (default: platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// WebSocket control-channel port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// HTTP API port.
    #[arg(long)]
    http_port: Option<u16>,

    /// Public base URL for join links.
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Log filter, e.g. `airmic=debug`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AirmicConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.ws_port {
            config.server.ws_port = port;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if let Some(url) = &self.base_url {
            config.server.base_url = url.clone();
        }
    }
}

fn init_tracing(args: &Args, config: &AirmicConfig) {
    let filter = match &args.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("airmic-coordinator: {e}");
            std::process::exit(1);
        }
    };
    args.apply(&mut config);
    init_tracing(&args, &config);

    if let Err(e) = validation::validate(&config) {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    let coordinator = Coordinator::from_config(&config);
    let shutdown = CancellationToken::new();

    let ws_addr = format!("{}:{}", config.server.host, config.server.ws_port);
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let ws_listener = TcpListener::bind(&ws_addr)
        .await
        .expect("Failed to bind WebSocket listener");
    let http_listener = TcpListener::bind(&http_addr)
        .await
        .expect("Failed to bind HTTP listener");

    tracing::info!("airmic-coordinator control channel on ws://{}", ws_addr);
    tracing::info!("airmic-coordinator HTTP API on http://{}", http_addr);
    tracing::info!(
        "Mic join links: {}{}?room=<CODE>",
        config.server.public_base_url(),
        config.qr.path
    );

    let limits = ConnectionLimits {
        handshake_timeout: Duration::from_secs(u64::from(config.server.handshake_timeout_secs)),
        outbound_queue: config.server.outbound_queue as usize,
    };
    let ws_task = tokio::spawn(serve_ws(
        ws_listener,
        coordinator.clone(),
        limits,
        shutdown.clone(),
    ));
    let http_task = tokio::spawn(serve_http(
        http_listener,
        HttpState {
            store: coordinator.store.clone(),
            qr: coordinator.qr.clone(),
        },
        shutdown.clone(),
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutting down");
    shutdown.cancel();

    let _ = ws_task.await;
    match http_task.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "HTTP server error"),
        Err(e) => tracing::warn!(error = %e, "HTTP task failed"),
        Ok(Ok(())) => {}
    }
    tracing::info!(rooms = coordinator.store.room_count().await, "Stopped");
}
