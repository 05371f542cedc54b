use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ctrl::api::GatewayServer;
use ctrl::config::{Config, ObservabilityConfig};
use ctrl::device::{Capabilities, DisplayInfo, HeadlessDevice};
use ctrl::security::AllowlistStore;

#[derive(Parser, Debug)]
#[command(name = "ctrl-server")]
#[command(about = "MCP gateway for remote device control")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CTRL_CONFIG", default_value = "ctrl.toml")]
    config: PathBuf,

    /// Host to bind to (overrides server.bind_addr)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.bind_addr)
    #[arg(short, long)]
    port: Option<u16>,

    /// Admit an address or CIDR block (repeatable)
    #[arg(long = "allow", value_name = "ENTRY")]
    allow: Vec<String>,

    /// Admit every caller
    #[arg(long)]
    no_allowlist: bool,
}

fn init_tracing(obs: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| obs.log_level.clone()),
    );
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| obs.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Combine `--host`/`--port` with the configured bind address
fn bind_addr(configured: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (cfg_host, cfg_port) = configured.rsplit_once(':').unwrap_or((configured, "8787"));
    let host = host.unwrap_or(cfg_host);
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => format!("{}:{}", host, cfg_port),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    init_tracing(&config.observability);

    if args.host.is_some() || args.port.is_some() {
        config.server.bind_addr =
            bind_addr(&config.server.bind_addr, args.host.as_deref(), args.port);
    }

    tracing::info!("Starting CTRL MCP gateway on {}", config.server.bind_addr);
    tracing::info!("Config file: {}", args.config.display());

    let allowlist = AllowlistStore::from_settings(&config.security.allowlist);
    for entry in &args.allow {
        allowlist
            .add_entry(entry)
            .with_context(|| format!("Invalid --allow entry {:?}", entry))?;
    }
    if args.no_allowlist {
        tracing::warn!("Allowlist disabled; every caller is admitted");
        allowlist.set_enabled(false);
    }

    let device = HeadlessDevice::new(DisplayInfo::from(config.device));
    let caps = Capabilities::from_backend(Arc::new(device));

    let mut server = GatewayServer::new(&config, caps, allowlist);
    if config.observability.metrics_enabled {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        server = server.with_metrics(handle);
    }

    server.serve(shutdown_signal()).await?;

    Ok(())
}
