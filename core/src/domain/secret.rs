//! SecretBundle — the set of keys owned by a route domain or an
//! attachment container. Values are never surfaced to listing operations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The owner of a secret bundle: either a route domain or an attachment
/// container name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretOwner {
    Domain(String),
    Attachment(String),
}

impl SecretOwner {
    pub fn as_str(&self) -> &str {
        match self {
            SecretOwner::Domain(d) => d,
            SecretOwner::Attachment(a) => a,
        }
    }
}

/// Keys known for a bundle, without their values — the shape returned by
/// `ListSecrets`/`ListKeys`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretKeys {
    pub keys: Vec<String>,
}

impl SecretKeys {
    pub fn from_set(set: BTreeSet<String>) -> Self {
        SecretKeys {
            keys: set.into_iter().collect(),
        }
    }
}

/// A fully materialized key/value bundle, used internally by the store
/// implementations and by the deployment orchestrator's env merge (§4.6
/// step 6). Never serialized back to an admin-facing response.
#[derive(Debug, Clone, Default)]
pub struct SecretValues {
    pub values: BTreeMap<String, String>,
}

impl SecretValues {
    pub fn keys(&self) -> BTreeSet<String> {
        self.values.keys().cloned().collect()
    }
}
