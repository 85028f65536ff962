//! `gordon logs` — tail Gordon's own process log or a route's container
//! log. Both admin endpoints frame their stream as SSE (`data: line\n\n`);
//! this module parses that framing directly rather than pulling in a
//! full SSE client, since the CLI only ever reads, never reconnects.

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;

use crate::daemon::client::AdminClient;

#[derive(Args)]
pub struct LogsArgs {
    /// Tail a specific route's container instead of Gordon's own process log
    pub domain: Option<String>,

    /// Number of trailing lines to request
    #[arg(long, default_value_t = 200)]
    pub lines: u32,

    /// Keep the connection open and stream new lines as they arrive
    #[arg(long)]
    pub follow: bool,
}

pub async fn handle_command(args: LogsArgs, client: &AdminClient) -> Result<()> {
    let path = match &args.domain {
        Some(domain) => format!("/logs/{domain}?lines={}&follow={}", args.lines, args.follow),
        None => format!("/logs?lines={}&follow={}", args.lines, args.follow),
    };
    let mut stream = client.stream_lines(&path).await.context("failed to open log stream")?;
    while let Some(line) = stream.next().await {
        println!("{}", line?);
    }
    Ok(())
}
