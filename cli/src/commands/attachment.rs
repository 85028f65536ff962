//! `gordon attachment` — sidecar images bound to a route domain or
//! network group.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use crate::daemon::client::AdminClient;

#[derive(Subcommand)]
pub enum AttachmentCommand {
    /// List images attached to a target
    List { target: String },
    /// Attach a sidecar image
    Add { target: String, image: String },
    /// Detach a sidecar image
    Remove { target: String, image: String },
}

pub async fn handle_command(command: AttachmentCommand, client: &AdminClient) -> Result<()> {
    match command {
        AttachmentCommand::List { target } => list(client, &target).await,
        AttachmentCommand::Add { target, image } => add(client, &target, &image).await,
        AttachmentCommand::Remove { target, image } => remove(client, &target, &image).await,
    }
}

async fn list(client: &AdminClient, target: &str) -> Result<()> {
    let images = client.get(&format!("/attachments/{target}")).await?;
    println!("{}", serde_json::to_string_pretty(&images)?);
    Ok(())
}

async fn add(client: &AdminClient, target: &str, image: &str) -> Result<()> {
    client.post_json(&format!("/attachments/{target}"), &json!({ "image": image })).await?;
    println!("{}", format!("✓ attached {image} to {target}").green());
    Ok(())
}

async fn remove(client: &AdminClient, target: &str, image: &str) -> Result<()> {
    client.delete(&format!("/attachments/{target}/{image}")).await?;
    println!("{}", format!("✓ detached {image} from {target}").green());
    Ok(())
}
