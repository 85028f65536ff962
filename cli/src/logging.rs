//! Logging bootstrap. The CLI owns process-wide subscriber initialization
//! (the core crate never installs a global subscriber itself, so it stays
//! usable as a library with its own logging story). The daemon path also
//! layers in a [`ProcessLogBuffer`](gordon_core::infrastructure::logs::ProcessLogBuffer)
//! so the admin API can serve back Gordon's own recent log lines.

use anyhow::{Context, Result};
use gordon_core::infrastructure::logs::{ProcessLogBuffer, ProcessLogLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Plain CLI logging: formatted output to stderr, level from `RUST_LOG`
/// or the given default.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .context("failed to install logging subscriber")
}

/// Daemon logging: the same formatted stderr output, plus a ring-buffer
/// layer so `GetProcessLogs` has something to serve.
pub fn init_daemon_logging(default_level: &str) -> Result<ProcessLogBuffer> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let buffer = ProcessLogBuffer::new();

    tracing_subscriber::registry()
        .with(ProcessLogLayer::new(buffer.clone()))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact().with_filter(filter))
        .try_init()
        .context("failed to install logging subscriber")?;

    Ok(buffer)
}
