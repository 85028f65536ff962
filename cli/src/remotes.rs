//! `remotes.toml` CRUD: the CLI's record of named Gordon daemons it can
//! talk to, plus which one is active. Lives at
//! `<user-config-dir>/gordon/remotes.toml`, written with owner-only
//! permissions since it can carry a bearer token.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_tls: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl RemoteEntry {
    /// The token to send: an inline value takes precedence over the
    /// environment variable it names, since an operator who set both
    /// almost certainly means the explicit one to win.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| self.token_env.as_deref().and_then(|name| std::env::var(name).ok()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemotesFile {
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteEntry>,
}

pub fn remotes_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("could not determine the user config directory")?;
    Ok(config_dir.join("gordon").join("remotes.toml"))
}

impl RemotesFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RemotesFile::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            set_permissions(parent, 0o700)?;
        }
        let rendered = toml::to_string_pretty(self).context("failed to render remotes.toml")?;
        std::fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
        set_permissions(path, 0o600)?;
        Ok(())
    }

    pub fn add(&mut self, name: &str, entry: RemoteEntry) {
        let make_active = self.remotes.is_empty();
        self.remotes.insert(name.to_string(), entry);
        if make_active {
            self.active = Some(name.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.remotes.remove(name).is_none() {
            bail!("no remote named {name:?}");
        }
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.remotes.contains_key(name) {
            bail!("no remote named {name:?}");
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn active_remote(&self) -> Option<(&str, &RemoteEntry)> {
        let name = self.active.as_deref()?;
        self.remotes.get(name).map(|entry| (name, entry))
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_added_remote_becomes_active() {
        let mut file = RemotesFile::default();
        file.add("prod", RemoteEntry { url: "https://gordon.example.com".into(), ..Default::default() });
        assert_eq!(file.active.as_deref(), Some("prod"));
    }

    #[test]
    fn removing_active_remote_clears_active() {
        let mut file = RemotesFile::default();
        file.add("prod", RemoteEntry { url: "https://a".into(), ..Default::default() });
        file.remove("prod").unwrap();
        assert!(file.active.is_none());
        assert!(file.remotes.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gordon").join("remotes.toml");

        let mut file = RemotesFile::default();
        file.add(
            "prod",
            RemoteEntry {
                url: "https://gordon.example.com".into(),
                token_env: Some("GORDON_TOKEN_PROD".into()),
                ..Default::default()
            },
        );
        file.save(&path).unwrap();

        let loaded = RemotesFile::load(&path).unwrap();
        assert_eq!(loaded.active.as_deref(), Some("prod"));
        assert_eq!(loaded.remotes["prod"].url, "https://gordon.example.com");
    }

    #[test]
    fn inline_token_takes_precedence_over_env() {
        std::env::set_var("GORDON_REMOTES_TEST_TOKEN", "from-env");
        let entry = RemoteEntry {
            url: "https://a".into(),
            token: Some("inline".into()),
            token_env: Some("GORDON_REMOTES_TEST_TOKEN".into()),
            insecure_tls: false,
        };
        assert_eq!(entry.resolve_token().as_deref(), Some("inline"));
        std::env::remove_var("GORDON_REMOTES_TEST_TOKEN");
    }
}
