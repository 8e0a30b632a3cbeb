//! otel-relay - OTLP log relay for editor-integrated coding agents
//!
//! Listens for the agent's OTLP/HTTP log exports and forwards each relevant
//! event to the editor instance that owns the event's workspace.

use anyhow::{Context, Result};
use clap::Parser;
use otel_relay::relay::DEFAULT_PORT;
use otel_relay::relay::storage::PidFile;
use otel_relay::{Relay, RelayConfig, service};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otel-relay", version)]
#[command(about = "Routes coding-agent OTLP log events to the owning editor", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "OTEL_RELAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Where to write this process's pid
    #[arg(long, env = "OTEL_RELAY_PID_FILE")]
    pid_file: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "OTEL_RELAY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "OTEL_RELAY_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Editor project state file
    #[arg(long, env = "OTEL_RELAY_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Agent session store
    #[arg(long, env = "OTEL_RELAY_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Directory holding editor rendezvous files
    #[arg(long, env = "OTEL_RELAY_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    /// Editor channel timeout in milliseconds
    #[arg(long, env = "OTEL_RELAY_FORWARD_TIMEOUT_MS", default_value_t = 5_000)]
    forward_timeout_ms: u64,

    /// Seconds before retrying a conversation that could not be resolved (0 = never)
    #[arg(long, env = "OTEL_RELAY_NEGATIVE_TTL_SECS", default_value_t = 10)]
    negative_ttl_secs: u64,
}

impl Cli {
    fn config(&self) -> RelayConfig {
        let defaults = RelayConfig::default();
        RelayConfig {
            bind: self.bind.clone(),
            port: self.port,
            state_file: self.state_file.clone().unwrap_or(defaults.state_file),
            session_dir: self.session_dir.clone().unwrap_or(defaults.session_dir),
            runtime_dir: self.runtime_dir.clone().unwrap_or(defaults.runtime_dir),
            forward_timeout_ms: self.forward_timeout_ms,
            negative_ttl_secs: self.negative_ttl_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let config = cli.config();
    config.validate().context("invalid configuration")?;
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve listen address")?;

    let pid_file = PidFile::create(&cli.pid_file)
        .with_context(|| format!("failed to write pid file {}", cli.pid_file.display()))?;

    info!(
        addr = %local_addr,
        state_file = %config.state_file.display(),
        session_dir = %config.session_dir.display(),
        runtime_dir = %config.runtime_dir.display(),
        version = otel_relay::VERSION,
        "otel-relay listening"
    );

    let relay = Arc::new(Relay::with_editor_channels(config));
    let served = service::serve(listener, relay, shutdown_signal()).await;

    drop(pid_file);
    served.context("server exited unexpectedly")?;
    info!("otel-relay stopped");
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
