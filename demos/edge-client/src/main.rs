//! Edge client
//!
//! Keeps a secure session with the coordination server open and answers every
//! skill request with the default response template.
//!
//! Usage:
//!   edge-client [--config edge-client.toml] [--host HOST] [--port PORT] [--verbose]
//!
//! Keys come from the config file's `[credentials]` table, or from flags and
//! `SKILL_BRIDGE_*` environment variables, which take precedence.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use skill_bridge_core::{Credentials, SessionConfig, SessionEvent, SkillRequestNotice};
use skill_bridge_session::{Session, SessionHandle};
use skill_bridge_transport::websocket::WsConnector;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Skill bridge edge client
#[derive(Parser)]
#[command(name = "edge-client")]
#[command(about = "Secure session client for the skill coordination server")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coordination server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Coordination server port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Instance public key, base64
    #[arg(long, env = "SKILL_BRIDGE_INSTANCE_PUBLIC_KEY")]
    instance_public_key: Option<String>,

    /// Instance private key, base64
    #[arg(long, env = "SKILL_BRIDGE_INSTANCE_PRIVATE_KEY", hide_env_values = true)]
    instance_private_key: Option<String>,

    /// Server public key, base64
    #[arg(long, env = "SKILL_BRIDGE_SERVER_PUBLIC_KEY")]
    server_public_key: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    session: SessionConfig,
    credentials: Option<Credentials>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn resolve_credentials(args: &Args, file: Option<Credentials>) -> anyhow::Result<Credentials> {
    let pick = |flag: Option<&String>, from_file: Option<String>, name: &str| {
        flag.cloned()
            .or(from_file)
            .with_context(|| format!("missing {name}"))
    };

    Ok(Credentials {
        instance_public_key: pick(
            args.instance_public_key.as_ref(),
            file.as_ref().map(|c| c.instance_public_key.clone()),
            "instance public key",
        )?,
        instance_private_key: pick(
            args.instance_private_key.as_ref(),
            file.as_ref().map(|c| c.instance_private_key.clone()),
            "instance private key",
        )?,
        server_public_key: pick(
            args.server_public_key.as_ref(),
            file.as_ref().map(|c| c.server_public_key.clone()),
            "server public key",
        )?,
    })
}

async fn answer(handle: &SessionHandle, notice: SkillRequestNotice) {
    let body = match serde_json::to_value(&notice.skill_response) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to build response: {e}");
            return;
        }
    };
    match handle.route_reply(notice.reply(body)).await {
        Ok(sequence) => tracing::info!(sequence, "Answered skill request"),
        Err(e) => tracing::warn!("Skill response not sent: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let file = load_config(args.config.as_deref())?;
    let mut config = file.session;
    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let keys = resolve_credentials(&args, file.credentials)?
        .load()
        .context("invalid credentials")?;

    let session = Session::new(config, keys, WsConnector::new());
    let (handle, task) = session.spawn();
    tracing::info!(session = %handle.id(), "Session started");

    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                handle.shutdown().await;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SkillRequest(notice)) => answer(&handle, notice).await,
                Ok(SessionEvent::Status(status)) => {
                    tracing::info!(fill = ?status.fill(), "Status: {status}");
                }
                Ok(SessionEvent::Diagnostic(message)) => tracing::debug!("Diagnostic: {message}"),
                Ok(SessionEvent::Closed) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {n} session events"),
            }
        }
    }

    task.await.context("session task failed")?;
    Ok(())
}
