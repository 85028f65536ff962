//! The on-disk TOML schema for `gordon.toml` (§6) — the raw, serde-facing
//! representation of every top-level table the config file carries. The
//! domain layer's [`Route`](crate::domain::route::Route)/
//! [`AttachmentBinding`](crate::domain::route::AttachmentBinding) types
//! are parsed from and rendered back into this shape by [`config_store`];
//! the `[server]`/`[auto_route]`/`[network_isolation]`/`[auth]`/
//! `[volumes]` sections are exposed by `ConfigStore` as read-mostly
//! settings — operators edit them by hand, Gordon never mutates them at
//! runtime.
//!
//! Per §9's "runtime-typed config maps" design note, this struct is the
//! one place the untyped TOML tree gets destructured; everything above
//! `config_store` works with strongly-typed domain values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_server_port() -> u16 {
    8080
}

fn default_registry_port() -> u16 {
    5000
}

fn default_network_prefix() -> String {
    "gordon".to_string()
}

fn default_volume_prefix() -> String {
    "gordon".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default = "default_registry_port")]
    pub registry_port: u16,

    #[serde(default)]
    pub registry_domain: Option<String>,

    /// Alias for `registry_domain`. Preferred over it when both are
    /// present per §9's explicit precedence rule.
    #[serde(default)]
    pub gordon_domain: Option<String>,

    #[serde(default)]
    pub data_dir: Option<String>,
}

impl ServerSection {
    /// The registry domain actually in effect, honoring the `gordon_domain`
    /// > `registry_domain` precedence §9 calls out.
    pub fn effective_registry_domain(&self) -> Option<&str> {
        self.gordon_domain
            .as_deref()
            .or(self.registry_domain.as_deref())
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            port: default_server_port(),
            registry_port: default_registry_port(),
            registry_domain: None,
            gordon_domain: None,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRouteSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AutoRouteSection {
    fn default() -> Self {
        AutoRouteSection { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkIsolationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_network_prefix")]
    pub network_prefix: String,
}

impl Default for NetworkIsolationSection {
    fn default() -> Self {
        NetworkIsolationSection {
            enabled: true,
            network_prefix: default_network_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumesSection {
    #[serde(default = "default_true")]
    pub auto_create: bool,

    #[serde(default = "default_volume_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub preserve: bool,
}

impl Default for VolumesSection {
    fn default() -> Self {
        VolumesSection {
            auto_create: true,
            prefix: default_volume_prefix(),
            preserve: false,
        }
    }
}

/// Credentials for the image registry, attached to `pull_image` calls
/// when present (§4.6 step 4). Absent by default — most deployments pull
/// from an unauthenticated or already-logged-in registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryAuthSection {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub server_address: Option<String>,
}

/// Raw TOML document (§6). `routes` maps the possibly-`http://`-prefixed
/// domain to an image reference; `external_routes` maps a domain directly
/// to a `host:port` target that bypasses container resolution entirely
/// (used for the image registry's own admin-facing domain, among other
/// things); `network_groups` maps a group name to its member domains;
/// `attachments` maps a route domain or network-group name to its
/// sidecar image list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub auto_route: AutoRouteSection,

    #[serde(default)]
    pub network_isolation: NetworkIsolationSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub volumes: VolumesSection,

    #[serde(default)]
    pub registry_auth: RegistryAuthSection,

    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    #[serde(default)]
    pub external_routes: BTreeMap<String, String>,

    #[serde(default)]
    pub network_groups: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub attachments: BTreeMap<String, Vec<String>>,
}

impl RawConfig {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn render(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = RawConfig::default();
        cfg.routes.insert("app.example.com".into(), "web:1".into());
        cfg.routes
            .insert("http://legacy.example".into(), "legacy:1".into());
        cfg.external_routes
            .insert("reg.example.com".into(), "localhost:5000".into());
        cfg.network_groups
            .insert("backend".into(), vec!["app.example.com".into()]);
        cfg.attachments
            .insert("app.example.com".into(), vec!["redis:latest".into()]);

        let rendered = cfg.render().unwrap();
        let parsed = RawConfig::parse(&rendered).unwrap();
        assert_eq!(parsed.routes, cfg.routes);
        assert_eq!(parsed.external_routes, cfg.external_routes);
        assert_eq!(parsed.network_groups, cfg.network_groups);
        assert_eq!(parsed.attachments, cfg.attachments);
    }

    #[test]
    fn missing_tables_default_to_empty() {
        let cfg = RawConfig::parse("").unwrap();
        assert!(cfg.routes.is_empty());
        assert!(cfg.external_routes.is_empty());
        assert!(cfg.network_groups.is_empty());
        assert!(cfg.attachments.is_empty());
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.auto_route.enabled);
        assert!(cfg.network_isolation.enabled);
        assert!(!cfg.auth.enabled);
        assert!(cfg.volumes.auto_create);
    }

    #[test]
    fn gordon_domain_takes_precedence_over_registry_domain() {
        let cfg = RawConfig::parse(
            r#"
            [server]
            registry_domain = "old.example.com"
            gordon_domain = "new.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.effective_registry_domain(), Some("new.example.com"));
    }

    #[test]
    fn falls_back_to_registry_domain_when_gordon_domain_absent() {
        let cfg = RawConfig::parse(
            r#"
            [server]
            registry_domain = "old.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.effective_registry_domain(), Some("old.example.com"));
    }
}
