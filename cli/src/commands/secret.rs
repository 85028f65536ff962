//! `gordon secret` — manage per-domain and per-attachment secret
//! bundles. Values are write-only from the CLI's perspective: the admin
//! service never returns them, only key names.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use crate::daemon::client::AdminClient;

#[derive(Subcommand)]
pub enum SecretCommand {
    /// List the secret keys owned by a domain or attachment container
    List { owner: String },
    /// Set (or overwrite) a secret value
    Set { owner: String, key: String, value: String },
    /// Delete a secret key
    Delete { owner: String, key: String },
}

pub async fn handle_command(command: SecretCommand, client: &AdminClient) -> Result<()> {
    match command {
        SecretCommand::List { owner } => list(client, &owner).await,
        SecretCommand::Set { owner, key, value } => set(client, &owner, &key, &value).await,
        SecretCommand::Delete { owner, key } => delete(client, &owner, &key).await,
    }
}

async fn list(client: &AdminClient, owner: &str) -> Result<()> {
    let keys = client.get(&format!("/secrets/{owner}")).await?;
    println!("{}", serde_json::to_string_pretty(&keys)?);
    Ok(())
}

async fn set(client: &AdminClient, owner: &str, key: &str, value: &str) -> Result<()> {
    client
        .put_json(&format!("/secrets/{owner}/{key}"), &json!({ "value": value }))
        .await?;
    println!("{}", format!("✓ set {owner}/{key}").green());
    Ok(())
}

async fn delete(client: &AdminClient, owner: &str, key: &str) -> Result<()> {
    client.delete(&format!("/secrets/{owner}/{key}")).await?;
    println!("{}", format!("✓ deleted {owner}/{key}").green());
    Ok(())
}
