//! File-backed `DomainSecretStore`: one `<owner>.env` file per domain or
//! attachment under the data directory, written atomically (temp file,
//! fsync, rename) with `0600` permissions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::errors::SecretError;
use crate::domain::secret::{SecretKeys, SecretValues};
use crate::domain::validation::{legacy_sanitize_owner, reject_path_traversal, sanitize_owner, validate_env_key};

use super::DomainSecretStore;

pub struct FileSecretStore {
    base_dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileSecretStore {
            base_dir: base_dir.into(),
        }
    }

    /// Compose `<base_dir>/<sanitized(owner)>.env`, verifying the result
    /// stays within `base_dir` after both are lexically cleaned — the
    /// sanitization scheme already strips every character that could
    /// introduce a path separator, but this check stands as the second
    /// line of defense the testable properties call for.
    fn owner_path(&self, owner: &str) -> Result<PathBuf, SecretError> {
        reject_path_traversal(owner)?;
        let filename = format!("{}.env", sanitize_owner(owner));
        let path = self.base_dir.join(&filename);
        self.assert_within_base(&path)?;
        Ok(path)
    }

    /// The filename this owner's secrets would have lived under before the
    /// collision-resistant substitution scheme was introduced — checked by
    /// `list_keys` so bundles written under the legacy naming are still
    /// discoverable.
    fn legacy_owner_path(&self, owner: &str) -> PathBuf {
        self.base_dir.join(format!("{}.env", legacy_sanitize_owner(owner)))
    }

    fn assert_within_base(&self, path: &Path) -> Result<(), SecretError> {
        let base = clean_path(&self.base_dir);
        let candidate = clean_path(path);
        if candidate.starts_with(&base) {
            Ok(())
        } else {
            Err(SecretError::PathTraversal(path.display().to_string()))
        }
    }

    fn read_values(path: &Path) -> Result<BTreeMap<String, String>, SecretError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(parse_env(&text))
    }

    fn write_values(path: &Path, values: &BTreeMap<String, String>) -> Result<(), SecretError> {
        if values.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = render_env(values);
        let tmp_path = path.with_extension("env.tmp");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            f.write_all(rendered.as_bytes())?;
            f.sync_all()?;
        }
        #[cfg(not(unix))]
        {
            std::fs::write(&tmp_path, rendered.as_bytes())?;
        }

        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (k, v) = line.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

fn render_env(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in values {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out
}

#[async_trait]
impl DomainSecretStore for FileSecretStore {
    async fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), SecretError> {
        validate_env_key(key)?;
        let path = self.owner_path(owner)?;
        let mut values = Self::read_values(&path)?;
        values.insert(key.to_string(), value.to_string());
        Self::write_values(&path, &values)
    }

    async fn get(&self, owner: &str, key: &str) -> Result<Option<String>, SecretError> {
        let path = self.owner_path(owner)?;
        Ok(Self::read_values(&path)?.get(key).cloned())
    }

    async fn delete(&self, owner: &str, key: &str) -> Result<(), SecretError> {
        let path = self.owner_path(owner)?;
        let mut values = Self::read_values(&path)?;
        if values.remove(key).is_none() {
            return Err(SecretError::NotFound(key.to_string()));
        }
        Self::write_values(&path, &values)
    }

    /// Accepts both the collision-resistant and the legacy sanitization
    /// prefix for backwards compatibility, deduplicating the result.
    async fn list_keys(&self, owner: &str) -> Result<SecretKeys, SecretError> {
        let path = self.owner_path(owner)?;
        let mut keys: std::collections::BTreeSet<String> = Self::read_values(&path)?.into_keys().collect();

        let legacy_path = self.legacy_owner_path(owner);
        if legacy_path != path {
            keys.extend(Self::read_values(&legacy_path)?.into_keys());
        }
        Ok(SecretKeys::from_set(keys))
    }

    async fn load_all(&self, owner: &str) -> Result<SecretValues, SecretError> {
        let path = self.owner_path(owner)?;
        let mut values = Self::read_values(&path)?;

        let legacy_path = self.legacy_owner_path(owner);
        if legacy_path != path {
            for (k, v) in Self::read_values(&legacy_path)? {
                values.entry(k).or_insert(v);
            }
        }
        Ok(SecretValues { values })
    }
}

/// Lexically normalize `.`/`..` components without touching the
/// filesystem (the composed path may not exist yet), so a traversal
/// attempt can be rejected before any I/O happens.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());

        store.set("app.example.com", "API_KEY", "secret1").await.unwrap();
        assert_eq!(
            store.get("app.example.com", "API_KEY").await.unwrap(),
            Some("secret1".to_string())
        );

        store.delete("app.example.com", "API_KEY").await.unwrap();
        assert_eq!(store.get("app.example.com", "API_KEY").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_path_traversal_in_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        let result = store.set("../../etc", "API_KEY", "x").await;
        assert!(matches!(result, Err(SecretError::PathTraversal(_))));
    }

    #[tokio::test]
    async fn rejects_invalid_env_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        assert!(store.set("app.example.com", "bad-key", "x").await.is_err());
    }

    #[tokio::test]
    async fn empty_after_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        store.set("app.example.com", "ONLY_KEY", "v").await.unwrap();
        store.delete("app.example.com", "ONLY_KEY").await.unwrap();

        let path = dir.path().join("app__example__com.env");
        assert!(!path.exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        store.set("app.example.com", "API_KEY", "secret1").await.unwrap();

        let path = dir.path().join("app__example__com.env");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[tokio::test]
    async fn filename_is_sanitized_collision_resistantly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        store.set("app.example.com", "API_KEY", "v1").await.unwrap();
        assert!(dir.path().join("app__example__com.env").exists());
    }

    #[tokio::test]
    async fn list_keys_merges_legacy_sanitization_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        // Simulate a bundle written under the pre-collision-resistant
        // naming scheme (all three separators collapsed to `_`).
        std::fs::write(dir.path().join("app_example_com.env"), "LEGACY_KEY=v\n").unwrap();

        store.set("app.example.com", "NEW_KEY", "v2").await.unwrap();

        let keys = store.list_keys("app.example.com").await.unwrap();
        assert_eq!(keys.keys, vec!["LEGACY_KEY".to_string(), "NEW_KEY".to_string()]);
    }
}
