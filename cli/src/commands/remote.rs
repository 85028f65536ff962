//! `gordon remote` — manage the set of named Gordon daemons recorded in
//! `remotes.toml`.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::remotes::{remotes_path, RemoteEntry, RemotesFile};

#[derive(Subcommand)]
pub enum RemoteCommand {
    /// List configured remotes
    List,
    /// Add (or replace) a remote
    Add {
        name: String,
        url: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        token_env: Option<String>,
        #[arg(long)]
        insecure_tls: bool,
    },
    /// Remove a remote
    Remove { name: String },
    /// Make a remote the default target
    SetActive { name: String },
}

pub async fn handle_command(command: RemoteCommand) -> Result<()> {
    let path = remotes_path()?;
    let mut file = RemotesFile::load(&path)?;

    match command {
        RemoteCommand::List => {
            for (name, entry) in &file.remotes {
                let marker = if file.active.as_deref() == Some(name) { "*" } else { " " };
                println!("{marker} {name}  {}", entry.url);
            }
            Ok(())
        }
        RemoteCommand::Add { name, url, token, token_env, insecure_tls } => {
            file.add(&name, RemoteEntry { url, token, token_env, insecure_tls });
            file.save(&path)?;
            println!("{}", format!("✓ saved remote {name}").green());
            Ok(())
        }
        RemoteCommand::Remove { name } => {
            file.remove(&name)?;
            file.save(&path)?;
            println!("{}", format!("✓ removed remote {name}").green());
            Ok(())
        }
        RemoteCommand::SetActive { name } => {
            file.set_active(&name)?;
            file.save(&path)?;
            println!("{}", format!("✓ {name} is now the active remote").green());
            Ok(())
        }
    }
}
