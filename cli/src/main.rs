//! The `gordon` binary: a CLI-first client for a Gordon daemon, plus the
//! `daemon run` entry point that embeds the services themselves.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gordon_cli::commands::{attachment, auth, daemon, deploy, logs, remote, route, secret, status};
use gordon_cli::daemon::client::AdminClient;
use gordon_cli::remotes::RemotesFile;
use gordon_cli::target::{self, TargetFlags};

#[derive(Parser)]
#[command(name = "gordon")]
#[command(version, about = "Single-host container deployment and routing daemon", long_about = None)]
struct Cli {
    /// Path to gordon.toml (overrides GORDON_CONFIG_PATH and the built-in default)
    #[arg(short, long, global = true, env = "GORDON_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Admin API base URL, e.g. https://gordon.example.com
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token for the admin API
    #[arg(long, global = true)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage routes
    Route {
        #[command(subcommand)]
        command: route::RouteCommand,
    },
    /// Manage per-domain and per-attachment secrets
    Secret {
        #[command(subcommand)]
        command: secret::SecretCommand,
    },
    /// Manage sidecar attachments
    Attachment {
        #[command(subcommand)]
        command: attachment::AttachmentCommand,
    },
    /// Deploy a container for a domain
    Deploy(deploy::DeployArgs),
    /// Show daemon status
    Status,
    /// Probe daemon health
    Health,
    /// Show effective configuration
    Config,
    /// Reload configuration from disk
    Reload,
    /// Tail process or container logs
    Logs(logs::LogsArgs),
    /// Exchange the admin password for a bearer token
    Login {
        #[arg(long)]
        password: String,
    },
    /// Verify the current token and show its claims
    Whoami,
    /// Manage named remote daemons
    Remote {
        #[command(subcommand)]
        command: remote::RemoteCommand,
    },
    /// Manage the Gordon daemon process
    Daemon {
        #[command(subcommand)]
        command: daemon::DaemonCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gordon_cli::logging::init_logging(&cli.log_level)?;

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    };
    std::process::exit(exit_code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    use gordon_core::domain::errors::ClientError;
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::ClientRejected { .. }) => 1,
        Some(_) => 2,
        None => 3,
    }
}

async fn run(cli: Cli) -> Result<()> {
    // `daemon` subcommands manage the background process itself and
    // never need an admin client; everything else talks to one.
    if let Commands::Daemon { command } = cli.command {
        return daemon::handle_command(command, cli.config).await;
    }
    if let Commands::Remote { command } = cli.command {
        return remote::handle_command(command).await;
    }

    let target = target::resolve(
        TargetFlags {
            url: cli.url,
            token: cli.token,
            insecure_tls: cli.insecure.then_some(true),
        },
        cli.config.as_deref(),
    )?;
    let client = AdminClient::new(target.url, target.token, target.insecure_tls);

    match cli.command {
        Commands::Route { command } => route::handle_command(command, &client).await,
        Commands::Secret { command } => secret::handle_command(command, &client).await,
        Commands::Attachment { command } => attachment::handle_command(command, &client).await,
        Commands::Deploy(args) => deploy::handle_command(args, &client).await,
        Commands::Status => status::status(&client).await,
        Commands::Health => status::health(&client).await,
        Commands::Config => status::config(&client).await,
        Commands::Reload => status::reload(&client).await,
        Commands::Logs(args) => logs::handle_command(args, &client).await,
        Commands::Login { password } => {
            let token = auth::login(&client, &password).await?;
            if let Some(name) = &target.remote_name {
                let path = gordon_cli::remotes::remotes_path()?;
                let mut file = RemotesFile::load(&path)?;
                if let Some(entry) = file.remotes.get_mut(name) {
                    entry.token = Some(token);
                    entry.token_env = None;
                    file.save(&path)?;
                }
            }
            Ok(())
        }
        Commands::Whoami => auth::whoami(&client).await,
        Commands::Daemon { .. } | Commands::Remote { .. } => unreachable!("handled above"),
    }
}
