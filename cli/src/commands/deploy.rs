//! `gordon deploy` — trigger the deployment orchestrator for a domain.

use std::io::IsTerminal;

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use dialoguer::Select;
use gordon_core::domain::errors::ClientError;
use serde_json::{json, Value};

use crate::daemon::client::AdminClient;

/// §4.6 step 2's caller-driven conflict choice, as a CLI-reachable value.
/// Mirrors `gordon_core::infrastructure::deploy::ConflictPolicy` but lives
/// here too since the wire encoding (snake_case strings) is a client
/// concern, not a library one.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConflictChoice {
    Fail,
    Replace,
    Reuse,
    Cancel,
}

impl ConflictChoice {
    fn as_wire(self) -> &'static str {
        match self {
            ConflictChoice::Fail => "fail",
            ConflictChoice::Replace => "replace",
            ConflictChoice::Reuse => "reuse",
            ConflictChoice::Cancel => "cancel",
        }
    }
}

#[derive(Args)]
pub struct DeployArgs {
    pub domain: String,
    pub image: String,

    /// Container port to expose through the proxy
    #[arg(long)]
    pub port: Option<u16>,

    /// Network to attach the container to (defaults to the isolated
    /// per-domain network)
    #[arg(long)]
    pub network: Option<String>,

    /// How to resolve a container already occupying this domain's name.
    /// Left unset, an interactive terminal is prompted for a choice when
    /// a conflict is found; a non-interactive one fails the deploy.
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictChoice>,
}

pub async fn handle_command(args: DeployArgs, client: &AdminClient) -> Result<()> {
    let conflict = args.on_conflict.unwrap_or(ConflictChoice::Fail);
    match deploy_with(&args, conflict, client).await {
        Ok(response) => {
            print_outcome(&args.domain, &response)?;
            Ok(())
        }
        Err(e) if args.on_conflict.is_none() && is_name_conflict(&e) && std::io::stdin().is_terminal() => {
            let choice = prompt_conflict_choice()?;
            let response = deploy_with(&args, choice, client).await?;
            print_outcome(&args.domain, &response)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn deploy_with(args: &DeployArgs, conflict: ConflictChoice, client: &AdminClient) -> Result<Value> {
    client
        .post_json(
            "/deploy",
            &json!({
                "domain": args.domain,
                "image": args.image,
                "exposed_port": args.port,
                "network": args.network,
                "conflict": conflict.as_wire(),
            }),
        )
        .await
        .map_err(anyhow::Error::from)
}

fn is_name_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ClientError>(), Some(ClientError::ClientRejected { status: 409, .. }))
}

fn prompt_conflict_choice() -> Result<ConflictChoice> {
    let options = ["Replace the existing container", "Reuse it if already running", "Cancel this deploy"];
    let picked = Select::new()
        .with_prompt("a container already occupies this domain's name")
        .items(&options)
        .default(0)
        .interact()?;
    Ok(match picked {
        0 => ConflictChoice::Replace,
        1 => ConflictChoice::Reuse,
        _ => ConflictChoice::Cancel,
    })
}

fn print_outcome(domain: &str, response: &Value) -> Result<()> {
    if response.get("reused").and_then(Value::as_bool).unwrap_or(false) {
        println!("{}", format!("✓ reused existing container for {domain}").green());
    } else {
        println!("{}", format!("✓ deployed {domain}").green());
    }
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
