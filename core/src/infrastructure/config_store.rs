//! `ConfigStore` — the authoritative, file-backed source of truth for
//! routes, network groups and attachments (§1, §4.2). Holds an in-memory
//! mirror behind a lock, persists every mutation to `gordon.toml`
//! atomically, and watches the file for external edits so changes made
//! outside the admin API are picked up too.
//!
//! Writes to the file by this process set `last_save`; the watcher
//! compares a change notification's arrival time against it and skips a
//! reload if the notification is plausibly an echo of our own write
//! (within 500ms), per the domain's config-reload invariant.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::domain::errors::ConfigError;
use crate::domain::events::GordonEvent;
use crate::domain::route::{AttachmentBinding, Route};
use crate::infrastructure::config_file::{
    AuthSection, AutoRouteSection, NetworkIsolationSection, RawConfig, RegistryAuthSection, ServerSection,
    VolumesSection,
};
use crate::infrastructure::event_bus::EventBus;

const SELF_WRITE_SUPPRESS_WINDOW: Duration = Duration::from_millis(500);

/// The read-mostly settings tables (§6): `[server]`, `[auto_route]`,
/// `[network_isolation]`, `[auth]`, `[volumes]`, `[registry_auth]`.
/// Gordon never mutates these at runtime — they're operator-edited and
/// only re-materialized on `Load`/`Reload`, unlike routes/attachments
/// which the admin API mutates.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerSection,
    pub auto_route: AutoRouteSection,
    pub network_isolation: NetworkIsolationSection,
    pub auth: AuthSection,
    pub volumes: VolumesSection,
    pub registry_auth: RegistryAuthSection,
}

#[derive(Debug, Clone, Default)]
struct ConfigState {
    settings: Settings,
    routes: BTreeMap<String, Route>,
    external_routes: BTreeMap<String, String>,
    network_groups: BTreeMap<String, Vec<String>>,
    attachments: BTreeMap<String, AttachmentBinding>,
}

impl ConfigState {
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut routes = BTreeMap::new();
        for (raw_domain, image) in raw.routes {
            let route = Route::parse(&raw_domain, image)?;
            routes.insert(route.domain.clone(), route);
        }

        let mut attachments = BTreeMap::new();
        for (target, images) in raw.attachments {
            let mut binding = AttachmentBinding::new(target.clone());
            for image in images {
                binding.add(image)?;
            }
            attachments.insert(target, binding);
        }

        Ok(ConfigState {
            settings: Settings {
                server: raw.server,
                auto_route: raw.auto_route,
                network_isolation: raw.network_isolation,
                auth: raw.auth,
                volumes: raw.volumes,
                registry_auth: raw.registry_auth,
            },
            routes,
            external_routes: raw.external_routes,
            network_groups: raw.network_groups,
            attachments,
        })
    }

    fn to_raw(&self) -> RawConfig {
        let mut routes = BTreeMap::new();
        for route in self.routes.values() {
            routes.insert(route.raw_key(), route.image.clone());
        }
        let mut attachments = BTreeMap::new();
        for (target, binding) in &self.attachments {
            if !binding.images.is_empty() {
                attachments.insert(target.clone(), binding.images.clone());
            }
        }
        RawConfig {
            server: self.settings.server.clone(),
            auto_route: self.settings.auto_route.clone(),
            network_isolation: self.settings.network_isolation.clone(),
            auth: self.settings.auth.clone(),
            volumes: self.settings.volumes.clone(),
            registry_auth: self.settings.registry_auth.clone(),
            routes,
            external_routes: self.external_routes.clone(),
            network_groups: self.network_groups.clone(),
            attachments,
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    state: RwLock<ConfigState>,
    last_save: AtomicU64,
    events: EventBus,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ConfigStore {
    /// Load `gordon.toml` at `path`, creating an empty one if it doesn't
    /// exist yet (a fresh install has no routes).
    pub fn load(path: impl Into<PathBuf>, events: EventBus) -> Result<Arc<Self>, ConfigError> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let raw = RawConfig::parse(&text).map_err(|e| ConfigError::ConfigParse(e.to_string()))?;
            ConfigState::from_raw(raw)?
        } else {
            ConfigState::default()
        };

        let store = Arc::new(ConfigStore {
            path,
            state: RwLock::new(state),
            last_save: AtomicU64::new(0),
            events,
        });
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file from disk, replacing the in-memory state. Used on
    /// startup-adjacent reloads and by the filesystem watcher.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(&self.path)?;
        let raw = RawConfig::parse(&text).map_err(|e| ConfigError::ConfigParse(e.to_string()))?;
        let next = ConfigState::from_raw(raw)?;
        *self.state.write() = next;
        self.events.publish(GordonEvent::ConfigReload);
        Ok(())
    }

    /// Atomically persist the current in-memory state: write to a sibling
    /// `.tmp` file, fsync, then rename over the target.
    fn persist(&self) -> Result<(), ConfigError> {
        let raw = self.state.read().to_raw();
        let rendered = raw.render().map_err(|e| ConfigError::ConfigParse(e.to_string()))?;

        let tmp_path = self.path.with_extension("toml.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        {
            use std::io::Write;
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(rendered.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.last_save.store(now_millis(), Ordering::SeqCst);
        Ok(())
    }

    /// Apply `mutate` to a clone of the current state, persist it, and
    /// only commit the mutation in memory if the write succeeded —
    /// rolling back otherwise so a failed persist never leaves the
    /// in-memory view ahead of disk.
    fn mutate_and_persist(
        &self,
        mutate: impl FnOnce(&mut ConfigState) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut candidate = self.state.read().clone();
        mutate(&mut candidate)?;

        let previous = std::mem::replace(&mut *self.state.write(), candidate);
        if let Err(e) = self.persist() {
            *self.state.write() = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn add_route(&self, domain: &str, image: &str) -> Result<(), ConfigError> {
        let route = Route::parse(domain, image)?;
        let host = route.domain.clone();
        self.mutate_and_persist(|s| {
            s.routes.insert(route.domain.clone(), route.clone());
            Ok(())
        })?;
        self.events.publish(GordonEvent::RouteAdded {
            domain: host,
            image: image.to_string(),
        });
        Ok(())
    }

    pub fn update_route(&self, domain: &str, image: &str) -> Result<(), ConfigError> {
        let route = Route::parse(domain, image)?;
        let host = route.domain.clone();
        self.mutate_and_persist(|s| {
            if !s.routes.contains_key(&host) {
                return Err(ConfigError::RouteNotFound(host.clone()));
            }
            s.routes.insert(host.clone(), route.clone());
            Ok(())
        })?;
        self.events.publish(GordonEvent::RouteUpdated {
            domain: host,
            image: image.to_string(),
        });
        Ok(())
    }

    pub fn remove_route(&self, domain: &str) -> Result<(), ConfigError> {
        let host = crate::domain::validation::split_https_prefix(domain).0;
        self.mutate_and_persist(|s| {
            if s.routes.remove(&host).is_none() {
                return Err(ConfigError::RouteNotFound(host.clone()));
            }
            Ok(())
        })?;
        self.events.publish(GordonEvent::RouteRemoved { domain: host });
        Ok(())
    }

    pub fn get_route(&self, domain: &str) -> Option<Route> {
        self.state.read().routes.get(domain).cloned()
    }

    pub fn list_routes(&self) -> Vec<Route> {
        self.state.read().routes.values().cloned().collect()
    }

    pub fn add_attachment(&self, target: &str, image: &str) -> Result<(), ConfigError> {
        self.mutate_and_persist(|s| {
            s.attachments
                .entry(target.to_string())
                .or_insert_with(|| AttachmentBinding::new(target))
                .add(image)
        })
    }

    pub fn remove_attachment(&self, target: &str, image: &str) -> Result<(), ConfigError> {
        self.mutate_and_persist(|s| {
            let binding = s
                .attachments
                .get_mut(target)
                .ok_or_else(|| ConfigError::AttachmentNotFound {
                    target: target.to_string(),
                    image: image.to_string(),
                })?;
            let emptied = binding.remove(image)?;
            if emptied {
                s.attachments.remove(target);
            }
            Ok(())
        })
    }

    pub fn list_attachments(&self, target: &str) -> Vec<String> {
        self.state
            .read()
            .attachments
            .get(target)
            .map(|b| b.images.clone())
            .unwrap_or_default()
    }

    /// The `[server]`/`[auto_route]`/`[network_isolation]`/`[auth]`/
    /// `[volumes]` settings currently loaded. Read-mostly: these are only
    /// refreshed by `Load`/`Reload`, never by the admin API's route and
    /// attachment mutators.
    pub fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    /// `host:port` target for a domain declared under `[external_routes]`,
    /// bypassing container resolution entirely (§6).
    pub fn get_external_route(&self, domain: &str) -> Option<String> {
        self.state.read().external_routes.get(domain).cloned()
    }

    pub fn list_network_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.state.read().network_groups.clone()
    }

    /// Spawn a debounced filesystem watcher on `gordon.toml`'s parent
    /// directory. Returns the `notify` watcher handle — callers must keep
    /// it alive for the duration they want watching to continue.
    pub fn watch(self: &Arc<Self>) -> Result<RecommendedWatcher, ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| ConfigError::Io(e.to_string()))?;

        let watch_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let store = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !event.paths.iter().any(|p| p == &store.path) {
                    continue;
                }
                let since_save = now_millis().saturating_sub(store.last_save.load(Ordering::SeqCst));
                if (since_save as u128) < SELF_WRITE_SUPPRESS_WINDOW.as_millis() {
                    continue;
                }
                if let Err(e) = store.reload() {
                    tracing::warn!(error = %e, "failed to reload gordon.toml after external change");
                }
            }
        });

        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> Arc<ConfigStore> {
        let path = dir.path().join("gordon.toml");
        ConfigStore::load(path, EventBus::new()).unwrap()
    }

    #[test]
    fn add_then_list_route() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add_route("app.example.com", "web:1").unwrap();
        let routes = store.list_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].image, "web:1");
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gordon.toml");
        let store = ConfigStore::load(&path, EventBus::new()).unwrap();
        store.add_route("app.example.com", "web:1").unwrap();
        drop(store);

        let store2 = ConfigStore::load(&path, EventBus::new()).unwrap();
        assert_eq!(store2.list_routes().len(), 1);
    }

    #[test]
    fn update_missing_route_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.update_route("missing.example.com", "web:1"),
            Err(ConfigError::RouteNotFound(_))
        ));
    }

    #[test]
    fn remove_missing_route_errors_and_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add_route("app.example.com", "web:1").unwrap();
        assert!(store.remove_route("other.example.com").is_err());
        assert_eq!(store.list_routes().len(), 1);
    }

    #[test]
    fn settings_default_to_spec_values_when_tables_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let settings = store.settings();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.network_isolation.enabled);
        assert!(!settings.auth.enabled);
    }

    #[test]
    fn external_route_is_readable_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gordon.toml");
        std::fs::write(
            &path,
            r#"
            [external_routes]
            "reg.example.com" = "localhost:5000"
            "#,
        )
        .unwrap();
        let store = ConfigStore::load(&path, EventBus::new()).unwrap();
        assert_eq!(
            store.get_external_route("reg.example.com"),
            Some("localhost:5000".to_string())
        );
    }

    #[test]
    fn attachment_add_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add_attachment("app.example.com", "redis:latest").unwrap();
        assert_eq!(store.list_attachments("app.example.com"), vec!["redis:latest"]);
        store.remove_attachment("app.example.com", "redis:latest").unwrap();
        assert!(store.list_attachments("app.example.com").is_empty());
    }

    #[test]
    fn failed_persist_rolls_back_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gordon.toml");
        let store = ConfigStore::load(&path, EventBus::new()).unwrap();
        store.add_route("app.example.com", "web:1").unwrap();

        // Make the directory read-only so persist() fails on rename/create.
        let mut perms = std::fs::metadata(dir.path()).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(dir.path(), perms.clone()).unwrap();

        let result = store.add_route("second.example.com", "web:2");

        perms.set_readonly(false);
        std::fs::set_permissions(dir.path(), perms).unwrap();

        assert!(result.is_err());
        assert_eq!(store.list_routes().len(), 1);
    }
}
