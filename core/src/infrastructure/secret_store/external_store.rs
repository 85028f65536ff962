//! External-credential-manager-backed `DomainSecretStore` (§4.3's
//! external-secrets design note). Values live in whatever the operator's
//! `CredentialManager` subprocess backs (a system keychain, a vault CLI,
//! etc); Gordon only keeps a `<owner>.keys` manifest alongside so it can
//! enumerate keys without the manager's cooperation.
//!
//! The manifest can drift from what the manager actually holds — an
//! operator deleting a credential outside Gordon, or a crash between a
//! store and a manifest write. [`ExternalSecretStore::self_heal`] is run
//! before every read of the manifest and drops entries the manager no
//! longer resolves.
//!
//! Multi-key writes (the deployment orchestrator's env apply) are
//! transactional: if any key in the batch fails to store, every key
//! already written in that batch is erased again before returning the
//! error, so a partial batch never lingers in the manager.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::errors::SecretError;
use crate::domain::secret::{SecretKeys, SecretValues};
use crate::domain::validation::{reject_path_traversal, validate_env_key};

use super::DomainSecretStore;

const SUBPROCESS_DEADLINE: Duration = Duration::from_secs(10);

/// The capability an external credential manager subprocess must provide.
/// A production implementation shells out to an operator-supplied binary;
/// tests substitute an in-memory double.
#[async_trait]
pub trait CredentialManager: Send + Sync {
    async fn store(&self, composite_key: &str, value: &str) -> Result<(), SecretError>;
    async fn retrieve(&self, composite_key: &str) -> Result<Option<String>, SecretError>;
    async fn erase(&self, composite_key: &str) -> Result<(), SecretError>;

    /// Enumerate composite keys stored under `prefix` (`gordon/env/<owner>/`),
    /// used by self-heal to discover orphan keys present in the manager but
    /// missing from the `.keys` manifest (§4.3 `ListKeys`). A manager that
    /// cannot enumerate (e.g. a write-only vault CLI) may return an empty
    /// list; self-heal then degrades to pruning stale manifest entries only.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SecretError>;
}

/// Invokes `<binary> store|retrieve|erase <key> [value]` as a subprocess,
/// reading the value from stdout on `retrieve` and treating any non-zero
/// exit or a deadline miss as [`SecretError::BackendUnavailable`].
pub struct SubprocessCredentialManager {
    binary: PathBuf,
}

impl SubprocessCredentialManager {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        SubprocessCredentialManager {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, SecretError> {
        let fut = Command::new(&self.binary).args(args).output();
        match tokio::time::timeout(SUBPROCESS_DEADLINE, fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SecretError::BackendUnavailable(e.to_string())),
            Err(_) => Err(SecretError::BackendBusy(format!(
                "external credential manager did not respond within {:?}",
                SUBPROCESS_DEADLINE
            ))),
        }
    }
}

#[async_trait]
impl CredentialManager for SubprocessCredentialManager {
    async fn store(&self, composite_key: &str, value: &str) -> Result<(), SecretError> {
        let output = self.run(&["store", composite_key, value]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SecretError::BackendUnavailable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    async fn retrieve(&self, composite_key: &str) -> Result<Option<String>, SecretError> {
        let output = self.run(&["retrieve", composite_key]).await?;
        if output.status.success() {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text))
            }
        } else {
            Ok(None)
        }
    }

    async fn erase(&self, composite_key: &str) -> Result<(), SecretError> {
        let output = self.run(&["erase", composite_key]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SecretError::BackendUnavailable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SecretError> {
        let output = self.run(&["ls", prefix]).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect())
        } else {
            // An `ls`-incapable manager is treated as "nothing enumerable",
            // not an error: self-heal still prunes stale manifest entries.
            Ok(Vec::new())
        }
    }
}

/// In-memory `CredentialManager` double for tests.
#[derive(Default)]
pub struct InMemoryCredentialManager {
    values: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl CredentialManager for InMemoryCredentialManager {
    async fn store(&self, composite_key: &str, value: &str) -> Result<(), SecretError> {
        self.values
            .lock()
            .insert(composite_key.to_string(), value.to_string());
        Ok(())
    }

    async fn retrieve(&self, composite_key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.lock().get(composite_key).cloned())
    }

    async fn erase(&self, composite_key: &str) -> Result<(), SecretError> {
        self.values.lock().remove(composite_key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SecretError> {
        Ok(self
            .values
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

fn composite_key(owner: &str, key: &str) -> String {
    format!("{owner}:{key}")
}

pub struct ExternalSecretStore {
    manager: std::sync::Arc<dyn CredentialManager>,
    manifest_dir: PathBuf,
}

impl ExternalSecretStore {
    pub fn new(manager: std::sync::Arc<dyn CredentialManager>, manifest_dir: impl Into<PathBuf>) -> Self {
        ExternalSecretStore {
            manager,
            manifest_dir: manifest_dir.into(),
        }
    }

    fn manifest_path(&self, owner: &str) -> Result<PathBuf, SecretError> {
        reject_path_traversal(owner)?;
        Ok(self.manifest_dir.join(format!("{owner}.keys")))
    }

    fn read_manifest_raw(&self, owner: &str) -> Result<BTreeSet<String>, SecretError> {
        let path = self.manifest_path(owner)?;
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    fn write_manifest(&self, owner: &str, keys: &BTreeSet<String>) -> Result<(), SecretError> {
        let path = self.manifest_path(owner)?;
        if keys.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = keys.iter().cloned().collect::<Vec<_>>().join("\n") + "\n";
        let tmp_path = path.with_extension("keys.tmp");
        std::fs::write(&tmp_path, rendered)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Reconcile the `.keys` manifest against what the manager actually
    /// holds: drop entries the manager no longer resolves, and adopt
    /// orphan keys discovered by enumerating the manager's `owner`
    /// namespace but never recorded in the manifest (§4.3 `ListKeys`: "if
    /// the manifest write fails, still return the union"). Persists the
    /// healed manifest if it changed from what was on disk, but always
    /// returns the union even if that write fails.
    async fn self_heal(&self, owner: &str) -> Result<BTreeSet<String>, SecretError> {
        let recorded = self.read_manifest_raw(owner)?;
        let mut healed = BTreeSet::new();
        let mut drifted = false;
        for key in &recorded {
            let composite = composite_key(owner, key);
            if self.manager.retrieve(&composite).await?.is_some() {
                healed.insert(key.clone());
            } else {
                drifted = true;
            }
        }

        let prefix = composite_key(owner, "");
        for composite in self.manager.list(&prefix).await? {
            if let Some(key) = composite.strip_prefix(&prefix) {
                if !healed.contains(key) {
                    healed.insert(key.to_string());
                    drifted = true;
                }
            }
        }

        if drifted {
            // Best-effort: a manifest write failure must not hide the
            // discovered union from the caller.
            let _ = self.write_manifest(owner, &healed);
        }
        Ok(healed)
    }

    /// Store a batch of key/value pairs transactionally: if any write
    /// fails, every key already stored in this batch is erased again
    /// before the error is returned.
    pub async fn set_many(&self, owner: &str, pairs: &[(String, String)]) -> Result<(), SecretError> {
        for (key, _) in pairs {
            validate_env_key(key)?;
        }

        let mut written = Vec::new();
        for (key, value) in pairs {
            let composite = composite_key(owner, key);
            match self.manager.store(&composite, value).await {
                Ok(()) => written.push(composite),
                Err(e) => {
                    for composite in written.iter().rev() {
                        let _ = self.manager.erase(composite).await;
                    }
                    return Err(e);
                }
            }
        }

        let mut keys = self.self_heal(owner).await?;
        for (key, _) in pairs {
            keys.insert(key.clone());
        }
        if let Err(e) = self.write_manifest(owner, &keys) {
            for (key, _) in pairs {
                let _ = self.manager.erase(&composite_key(owner, key)).await;
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl DomainSecretStore for ExternalSecretStore {
    async fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), SecretError> {
        self.set_many(owner, std::slice::from_ref(&(key.to_string(), value.to_string())))
            .await
    }

    async fn get(&self, owner: &str, key: &str) -> Result<Option<String>, SecretError> {
        self.manager.retrieve(&composite_key(owner, key)).await
    }

    async fn delete(&self, owner: &str, key: &str) -> Result<(), SecretError> {
        self.manager.erase(&composite_key(owner, key)).await?;
        let mut keys = self.self_heal(owner).await?;
        keys.remove(key);
        self.write_manifest(owner, &keys)
    }

    async fn list_keys(&self, owner: &str) -> Result<SecretKeys, SecretError> {
        Ok(SecretKeys::from_set(self.self_heal(owner).await?))
    }

    async fn load_all(&self, owner: &str) -> Result<SecretValues, SecretError> {
        let keys = self.self_heal(owner).await?;
        let mut values = std::collections::BTreeMap::new();
        for key in keys {
            if let Some(v) = self.manager.retrieve(&composite_key(owner, &key)).await? {
                values.insert(key, v);
            }
        }
        Ok(SecretValues { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> ExternalSecretStore {
        ExternalSecretStore::new(Arc::new(InMemoryCredentialManager::default()), dir.path())
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set("app.example.com", "API_KEY", "v1").await.unwrap();
        assert_eq!(
            store.get("app.example.com", "API_KEY").await.unwrap(),
            Some("v1".into())
        );
        store.delete("app.example.com", "API_KEY").await.unwrap();
        assert_eq!(store.get("app.example.com", "API_KEY").await.unwrap(), None);
    }

    #[tokio::test]
    async fn self_heal_discovers_orphan_keys_missing_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(InMemoryCredentialManager::default());
        // Key exists in the manager but was never recorded in `.keys`
        // (e.g. written out-of-band, or a crash before the manifest write).
        manager
            .store("example.com:API_KEY", "shh")
            .await
            .unwrap();
        let store = ExternalSecretStore::new(manager, dir.path());

        let keys = store.list_keys("example.com").await.unwrap();
        assert_eq!(keys.keys, vec!["API_KEY".to_string()]);

        let manifest = store.read_manifest_raw("example.com").unwrap();
        assert!(manifest.contains("API_KEY"));
    }

    #[tokio::test]
    async fn self_heal_drops_keys_the_manager_no_longer_has() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(InMemoryCredentialManager::default());
        let store = ExternalSecretStore::new(manager.clone(), dir.path());

        store.set("app.example.com", "API_KEY", "v1").await.unwrap();
        // Simulate an out-of-band deletion directly against the manager.
        manager.erase("app.example.com:API_KEY").await.unwrap();

        let keys = store.list_keys("app.example.com").await.unwrap();
        assert!(keys.keys.is_empty());
    }

    #[tokio::test]
    async fn failing_batch_member_rolls_back_prior_writes() {
        struct FlakyManager {
            inner: InMemoryCredentialManager,
        }
        #[async_trait]
        impl CredentialManager for FlakyManager {
            async fn store(&self, composite_key: &str, value: &str) -> Result<(), SecretError> {
                if composite_key.ends_with("SECOND") {
                    return Err(SecretError::BackendUnavailable("boom".into()));
                }
                self.inner.store(composite_key, value).await
            }
            async fn retrieve(&self, composite_key: &str) -> Result<Option<String>, SecretError> {
                self.inner.retrieve(composite_key).await
            }
            async fn erase(&self, composite_key: &str) -> Result<(), SecretError> {
                self.inner.erase(composite_key).await
            }
            async fn list(&self, prefix: &str) -> Result<Vec<String>, SecretError> {
                self.inner.list(prefix).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(FlakyManager {
            inner: InMemoryCredentialManager::default(),
        });
        let store = ExternalSecretStore::new(manager.clone(), dir.path());

        let result = store
            .set_many(
                "app.example.com",
                &[
                    ("FIRST".to_string(), "a".to_string()),
                    ("SECOND".to_string(), "b".to_string()),
                ],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(manager.retrieve("app.example.com:FIRST").await.unwrap(), None);
    }
}
