//! # codescope
//!
//! Runs the realtime update client against a codescope server: follows the
//! given projects, logs every update and the cache invalidations it causes,
//! and exits on ctrl-c or once reconnection gives up.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn, Level};

use codescope_core::{Message, MessageType, ProjectId};
use codescope_realtime::{ClientConfig, ClientSlot};
use codescope_sync::{LogNotifier, MemoryQueryCache, UpdateConsumer};
use codescope_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Pretty,
}

impl From<Format> for LogFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Json => LogFormat::Json,
            Format::Pretty => LogFormat::Pretty,
        }
    }
}

/// Codescope realtime update client.
#[derive(Parser, Debug)]
#[command(name = "codescope", about = "Follow live codescope analysis updates")]
struct Cli {
    /// Origin of the codescope server, e.g. `https://codescope.example.com`.
    #[arg(long, env = "CODESCOPE_ORIGIN")]
    origin: Option<String>,

    /// JSON client config. `--origin` overrides its origin.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project to follow. Repeatable.
    #[arg(long = "project", value_name = "PROJECT_ID")]
    projects: Vec<String>,

    /// Override the reconnection ceiling.
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    #[arg(long, value_enum, default_value = "pretty")]
    log_format: Format,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config.origin.clone_from(origin);
        }
        if let Some(max) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = max;
        }
        let _ = config
            .endpoint()
            .with_context(|| format!("invalid origin {}", config.origin))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        format: cli.log_format.into(),
    })
    .context("failed to initialise logging")?;

    let config = cli.client_config()?;
    let cache = Arc::new(MemoryQueryCache::with_history_limit(0));
    let consumer = Arc::new(UpdateConsumer::new(cache.clone(), Arc::new(LogNotifier)));
    let projects: Vec<ProjectId> = cli.projects.iter().map(ProjectId::from_raw).collect();
    let project_count = projects.len();

    let slot = ClientSlot::new(config);
    let mut guard = None;
    let client = slot
        .get_or_connect_with(|client| {
            guard = Some(consumer.attach(client.registry()));
            // Subscriptions do not survive a reconnect; renew them on every open.
            let sender = client.sender();
            let _resubscribe = client.subscribe(MessageType::Connected, move |_: &Message| {
                for project in &projects {
                    let _ = sender.subscribe_to_project(project);
                }
                Ok(())
            });
        })
        .context("failed to start realtime client")?;
    info!(url = %client.endpoint(), projects = project_count, "codescope client started");

    let mut state = client.watch_state();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
        exhausted = state.wait_for(|s| s.is_terminal()) => {
            if exhausted.is_ok() {
                warn!(attempts = client.reconnect_attempts(), "server unreachable, giving up");
            }
        }
    }

    drop(guard);
    slot.close().await;
    info!(invalidations = cache.invalidation_count(), "codescope client stopped");
    Ok(())
}
