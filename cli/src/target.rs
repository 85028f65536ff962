//! Target resolution: deciding which Gordon daemon a CLI invocation talks
//! to and with what credentials, honoring the precedence flag > env
//! (`GORDON_TARGET`/`GORDON_TOKEN`/`GORDON_INSECURE`) > client-config
//! `[client]` section > the active named remote in `remotes.toml`.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::remotes::RemotesFile;

/// Resolved connection details for one CLI invocation.
pub struct Target {
    pub url: String,
    pub token: Option<String>,
    pub insecure_tls: bool,
    pub remote_name: Option<String>,
    pub is_remote: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ClientConfigFile {
    #[serde(default)]
    client: Option<ClientSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSection {
    url: Option<String>,
    token: Option<String>,
    #[serde(default)]
    insecure_tls: bool,
}

fn parse_bool_env(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                tracing::warn!(name, value = other, "ignoring unrecognized boolean environment value");
                None
            }
        },
        Err(_) => None,
    }
}

/// CLI-flag overrides, passed in from `clap` global args. Each is `None`
/// when the operator didn't pass the flag.
#[derive(Debug, Default)]
pub struct TargetFlags {
    pub url: Option<String>,
    pub token: Option<String>,
    pub insecure_tls: Option<bool>,
}

pub fn resolve(flags: TargetFlags, gordon_toml_client_path: Option<&Path>) -> Result<Target> {
    let env_url = std::env::var("GORDON_TARGET").ok();
    let env_token = std::env::var("GORDON_TOKEN").ok();
    let env_insecure = parse_bool_env("GORDON_INSECURE");

    let client_config = gordon_toml_client_path
        .filter(|p| p.exists())
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|text| toml::from_str::<ClientConfigFile>(&text).ok())
        .and_then(|cfg| cfg.client);

    if let Some(url) = flags.url.or(env_url).or_else(|| client_config.as_ref().and_then(|c| c.url.clone())) {
        let token = flags
            .token
            .or(env_token)
            .or_else(|| client_config.as_ref().and_then(|c| c.token.clone()));
        let insecure_tls = flags
            .insecure_tls
            .or(env_insecure)
            .or_else(|| client_config.as_ref().map(|c| c.insecure_tls))
            .unwrap_or(false);
        return Ok(Target {
            url,
            token,
            insecure_tls,
            remote_name: None,
            is_remote: false,
        });
    }

    let remotes = RemotesFile::load(&crate::remotes::remotes_path()?)?;
    let (name, entry) = remotes
        .active_remote()
        .ok_or_else(|| anyhow::anyhow!("no target configured: pass --url, set GORDON_TARGET, or run `gordon remote add`"))?;
    Ok(Target {
        url: entry.url.clone(),
        token: entry.resolve_token(),
        insecure_tls: flags.insecure_tls.or(env_insecure).unwrap_or(entry.insecure_tls),
        remote_name: Some(name.to_string()),
        is_remote: true,
    })
}
