//! # codescope-telemetry
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter` built from
//! config (overridden by `RUST_LOG`), JSON or human-readable output, and a
//! reloadable filter so per-module levels can change at runtime.

#![deny(unsafe_code)]

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

/// Output format of the stdout layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable lines.
    Pretty,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `"codescope_realtime" => DEBUG`).
    pub module_levels: Vec<(String, Level)>,
    /// Stdout format.
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Json,
        }
    }
}

/// Telemetry setup failures.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Keeps the reload handle for the installed filter.
pub struct TelemetryGuard {
    base_level: Level,
    module_levels: Mutex<Vec<(String, Level)>>,
    handle: reload::Handle<EnvFilter, Registry>,
}

impl TelemetryGuard {
    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&self, module: &str, level: Level) -> Result<(), TelemetryError> {
        let mut levels = self.module_levels.lock();
        upsert_level(&mut levels, module, level);
        let directives = filter_directives(self.base_level, &levels);
        self.handle
            .reload(EnvFilter::new(directives))
            .map_err(|e| TelemetryError::Reload(e.to_string()))
    }

    /// Current per-module level overrides.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.module_levels.lock().clone()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(TelemetryGuard {
        base_level: config.log_level,
        module_levels: Mutex::new(config.module_levels),
        handle,
    })
}

/// Render the `EnvFilter` directive string for a base level and overrides.
pub fn filter_directives(base: Level, module_levels: &[(String, Level)]) -> String {
    let mut directives = base.to_string().to_lowercase();
    for (module, level) in module_levels {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(&level.to_string().to_lowercase());
    }
    directives
}

fn upsert_level(levels: &mut Vec<(String, Level)>, module: &str, level: Level) {
    if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
        entry.1 = level;
    } else {
        levels.push((module.to_string(), level));
    }
}
