//! `gordon status` / `gordon health` / `gordon config show` — read-only
//! snapshots of the daemon's state.

use anyhow::Result;

use crate::daemon::client::AdminClient;

pub async fn status(client: &AdminClient) -> Result<()> {
    let value = client.get("/status").await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn health(client: &AdminClient) -> Result<()> {
    let value = client.get("/health").await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn config(client: &AdminClient) -> Result<()> {
    let value = client.get("/config").await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn reload(client: &AdminClient) -> Result<()> {
    client.post_json("/reload", &serde_json::json!({})).await?;
    println!("reloaded configuration");
    Ok(())
}
