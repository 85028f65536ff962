//! `gordon route` — CRUD and restart against the admin service's route
//! table.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use crate::daemon::client::AdminClient;

#[derive(Subcommand)]
pub enum RouteCommand {
    /// List configured routes
    List {
        /// Include live container status, network and attachments
        #[arg(long)]
        detailed: bool,
    },
    /// Show one route
    Get { domain: String },
    /// Add a new route
    Add { domain: String, image: String },
    /// Update a route's image
    Update { domain: String, image: String },
    /// Remove a route
    Remove { domain: String },
    /// Restart the container currently serving a route
    Restart { domain: String },
}

pub async fn handle_command(command: RouteCommand, client: &AdminClient) -> Result<()> {
    match command {
        RouteCommand::List { detailed } => list(client, detailed).await,
        RouteCommand::Get { domain } => get(client, &domain).await,
        RouteCommand::Add { domain, image } => add(client, &domain, &image).await,
        RouteCommand::Update { domain, image } => update(client, &domain, &image).await,
        RouteCommand::Remove { domain } => remove(client, &domain).await,
        RouteCommand::Restart { domain } => restart(client, &domain).await,
    }
}

async fn list(client: &AdminClient, detailed: bool) -> Result<()> {
    let path = if detailed { "/routes?detailed=true" } else { "/routes" };
    let routes = client.get(path).await?;
    println!("{}", serde_json::to_string_pretty(&routes)?);
    Ok(())
}

async fn get(client: &AdminClient, domain: &str) -> Result<()> {
    let route = client.get(&format!("/routes/{domain}")).await?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

async fn add(client: &AdminClient, domain: &str, image: &str) -> Result<()> {
    client.post_json("/routes", &json!({ "domain": domain, "image": image })).await?;
    println!("{}", format!("✓ added route {domain} -> {image}").green());
    Ok(())
}

async fn update(client: &AdminClient, domain: &str, image: &str) -> Result<()> {
    client.put_json(&format!("/routes/{domain}"), &json!({ "image": image })).await?;
    println!("{}", format!("✓ updated route {domain} -> {image}").green());
    Ok(())
}

async fn remove(client: &AdminClient, domain: &str) -> Result<()> {
    client.delete(&format!("/routes/{domain}")).await?;
    println!("{}", format!("✓ removed route {domain}").green());
    Ok(())
}

async fn restart(client: &AdminClient, domain: &str) -> Result<()> {
    client.post_json(&format!("/restart/{domain}"), &json!({})).await?;
    println!("{}", format!("✓ restarted {domain}").green());
    Ok(())
}
