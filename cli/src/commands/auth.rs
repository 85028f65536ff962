//! `gordon whoami` and `gordon login` — token verification and the
//! password-for-token exchange.

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::daemon::client::AdminClient;

pub async fn whoami(client: &AdminClient) -> Result<()> {
    let value = client.get("/auth/verify").await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn login(client: &AdminClient, password: &str) -> Result<String> {
    let value = client.post_json("/auth/password", &json!({ "password": password })).await?;
    let token = value
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("daemon did not return a token"))?
        .to_string();
    println!("{}", "✓ authenticated".green());
    println!("{token}");
    Ok(token)
}
