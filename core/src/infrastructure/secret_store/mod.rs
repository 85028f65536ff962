//! `DomainSecretStore` — the capability seam for secret persistence (§1,
//! §4.3). Two backends exist: [`file_store`] writes env-file-shaped
//! secrets directly under the data directory; [`external_store`] delegates
//! to a subprocess-based external credential manager and self-heals a
//! `.keys` manifest alongside it. Exactly one is active per daemon, chosen
//! at startup.

pub mod external_store;
pub mod file_store;

use async_trait::async_trait;

use crate::domain::errors::SecretError;
use crate::domain::secret::{SecretKeys, SecretValues};

#[async_trait]
pub trait DomainSecretStore: Send + Sync {
    async fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), SecretError>;

    async fn get(&self, owner: &str, key: &str) -> Result<Option<String>, SecretError>;

    async fn delete(&self, owner: &str, key: &str) -> Result<(), SecretError>;

    async fn list_keys(&self, owner: &str) -> Result<SecretKeys, SecretError>;

    /// All key/value pairs for `owner`, used by the deployment
    /// orchestrator's env merge (§4.6 step 6). Never exposed through the
    /// admin API directly.
    async fn load_all(&self, owner: &str) -> Result<SecretValues, SecretError>;
}
