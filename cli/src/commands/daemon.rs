//! `gordon daemon` — start, stop and inspect the background Gordon
//! process. `start` re-execs the current binary with an internal `daemon
//! run` subcommand so the foreground CLI invocation can return promptly;
//! `run` is what that re-exec (and `--foreground`) actually invokes.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use gordon_core::infrastructure::admin::auth::AdminAuthenticator;

use crate::daemon::server::{DaemonConfig, SecretBackend};
use crate::daemon::{self, DaemonStatus};

/// Default bind address for the admin plane. Loopback-only: the admin
/// listener is never exposed beyond localhost unless an operator fronts
/// it with their own reverse proxy.
const DEFAULT_ADMIN_PORT: u16 = 7777;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background
    Start {
        #[arg(long)]
        foreground: bool,
    },
    /// Stop a running daemon
    Stop,
    /// Report whether a daemon is running
    Status,
    /// Run the daemon in the foreground (used internally by `start`)
    #[command(hide = true)]
    Run,
}

pub async fn handle_command(command: DaemonCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        DaemonCommand::Start { foreground } => start(config_path, foreground).await,
        DaemonCommand::Stop => stop(config_path),
        DaemonCommand::Status => status(config_path),
        DaemonCommand::Run => run(config_path).await,
    }
}

fn data_dir_for(config_path: &Option<PathBuf>) -> Result<PathBuf> {
    let path = resolve_config_path(config_path);
    if !path.exists() {
        return Ok(default_data_dir());
    }
    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let raw = gordon_core::infrastructure::config_file::RawConfig::parse(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(raw.server.data_dir.map(PathBuf::from).unwrap_or_else(default_data_dir))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("gordon")
}

/// Config file discovery, lowest to highest priority: `/etc/gordon/config.toml`,
/// then `./gordon.toml` if the former is absent, then `GORDON_CONFIG_PATH`,
/// then an explicit `--config` flag (already resolved into `config_path` by
/// clap's own `env` fallback, so this mostly just supplies the built-in
/// default when neither was given).
fn resolve_config_path(config_path: &Option<PathBuf>) -> PathBuf {
    config_path
        .clone()
        .or_else(|| std::env::var("GORDON_CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(builtin_default_config_path)
}

fn builtin_default_config_path() -> PathBuf {
    let system_default = PathBuf::from("/etc/gordon/config.toml");
    if system_default.exists() {
        system_default
    } else {
        PathBuf::from("gordon.toml")
    }
}

async fn start(config_path: Option<PathBuf>, foreground: bool) -> Result<()> {
    let data_dir = data_dir_for(&config_path)?;

    if let daemon::DaemonStatus::Running(pid) = daemon::status(&data_dir) {
        println!("{}", format!("daemon already running (PID {pid})").yellow());
        return Ok(());
    }

    if foreground {
        return run(config_path).await;
    }

    let current_exe = std::env::current_exe().context("failed to resolve current executable")?;
    let mut cmd = std::process::Command::new(current_exe);
    cmd.arg("daemon").arg("run");
    if let Some(path) = &config_path {
        cmd.arg("--config").arg(path);
    }

    std::fs::create_dir_all(&data_dir)?;
    let stdout = std::fs::File::create(data_dir.join("gordon.out"))?;
    let stderr = std::fs::File::create(data_dir.join("gordon.err"))?;
    cmd.stdin(std::process::Stdio::null()).stdout(stdout).stderr(stderr);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().context("failed to spawn daemon process")?;
    println!("{}", format!("✓ daemon starting (PID {})", child.id()).green());
    Ok(())
}

fn stop(config_path: Option<PathBuf>) -> Result<()> {
    let data_dir = data_dir_for(&config_path)?;
    daemon::stop(&data_dir)?;
    println!("{}", "✓ daemon stopped".green());
    Ok(())
}

fn status(config_path: Option<PathBuf>) -> Result<()> {
    let data_dir = data_dir_for(&config_path)?;
    match daemon::status(&data_dir) {
        DaemonStatus::Running(pid) => println!("{}", format!("running (PID {pid})").green()),
        DaemonStatus::Stale(pid) => println!("{}", format!("stale PID file (PID {pid} not alive)").yellow()),
        DaemonStatus::NotRunning => println!("not running"),
    }
    Ok(())
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let path = resolve_config_path(&config_path);
    if !path.exists() {
        bail!("configuration file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(&path)?;
    let raw = gordon_core::infrastructure::config_file::RawConfig::parse(&text)?;
    let data_dir = raw.server.data_dir.map(PathBuf::from).unwrap_or_else(default_data_dir);

    let process_logs = crate::logging::init_daemon_logging("info")?;

    daemon::write_pid_file(&data_dir)?;
    let _pid_guard = PidFileGuard { data_dir: data_dir.clone() };

    let jwt_secret = std::env::var("GORDON_JWT_SECRET")
        .map(|s| s.into_bytes())
        .unwrap_or_else(|_| {
            tracing::warn!("GORDON_JWT_SECRET not set; generating an ephemeral secret for this run");
            uuid::Uuid::new_v4().as_bytes().to_vec()
        });
    let admin_password_sha256 = std::env::var("GORDON_ADMIN_PASSWORD")
        .map(|p| AdminAuthenticator::hash_password(&p))
        .unwrap_or_else(|_| AdminAuthenticator::hash_password(&uuid::Uuid::new_v4().to_string()));

    let config = DaemonConfig {
        admin_addr: format!("127.0.0.1:{DEFAULT_ADMIN_PORT}").parse()?,
        proxy_addr: format!("0.0.0.0:{}", raw.server.port).parse()?,
        gordon_toml_path: path,
        data_dir,
        docker_socket: std::env::var("GORDON_DOCKER_SOCKET").ok(),
        jwt_secret,
        admin_password_sha256,
        secret_backend: SecretBackend::File,
        process_logs,
    };

    crate::daemon::server::run(config).await
}

/// Removes the PID file when the daemon process exits, including on the
/// error path out of `run` (e.g. a failed listener bind).
struct PidFileGuard {
    data_dir: PathBuf,
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = daemon::remove_pid_file(&self.data_dir);
    }
}
