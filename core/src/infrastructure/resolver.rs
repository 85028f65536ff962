//! `RouteResolver` — turns a request's `Host` header into a
//! [`ResolvedTarget`] by combining the config store's route table with a
//! live container lookup, and caches the result keyed by domain. The
//! cache is invalidated both by subscribing to the event bus (so a route
//! change is reflected immediately) and by a soft TTL as a backstop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::domain::errors::ResolverError;
use crate::domain::events::GordonEvent;
use crate::domain::resolver::{CachedTarget, ResolvedTarget};
use crate::domain::runtime::{http_priority_order, preferred_network, ContainerRuntime};
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::event_bus::EventBus;

const CACHE_TTL: Duration = Duration::from_secs(30);

pub struct RouteResolver {
    config: Arc<ConfigStore>,
    runtime: Arc<dyn ContainerRuntime>,
    cache: DashMap<String, CachedTarget>,
}

impl RouteResolver {
    pub fn new(config: Arc<ConfigStore>, runtime: Arc<dyn ContainerRuntime>) -> Arc<Self> {
        Arc::new(RouteResolver {
            config,
            runtime,
            cache: DashMap::new(),
        })
    }

    /// Subscribe this resolver to the event bus and spawn a background
    /// task that invalidates cache entries as routes change. Returns
    /// immediately; the task runs for the lifetime of the returned
    /// `EventBus` subscription.
    pub fn spawn_invalidation_listener(self: &Arc<Self>, bus: &EventBus) {
        let mut receiver = bus.subscribe();
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    GordonEvent::ConfigReload => resolver.cache.clear(),
                    GordonEvent::RouteAdded { domain, .. }
                    | GordonEvent::RouteUpdated { domain, .. }
                    | GordonEvent::RouteRemoved { domain } => {
                        resolver.cache.remove(&domain);
                    }
                    GordonEvent::ContainerStarted { .. } | GordonEvent::ContainerStopped { .. } => {
                        // A container restart can change its IP; safest is
                        // to drop the whole cache rather than track which
                        // domain a container name maps back to.
                        resolver.cache.clear();
                    }
                }
            }
        });
    }

    pub async fn resolve(&self, domain: &str) -> Result<ResolvedTarget, ResolverError> {
        if let Some(entry) = self.cache.get(domain) {
            if !entry.is_stale(CACHE_TTL) {
                return Ok(entry.target.clone());
            }
        }

        // `[external_routes]` bypass container resolution entirely: the
        // config already names a `host:port`, so there's no container to
        // inspect and nothing network-topology-dependent to cache beyond
        // the parsed address itself.
        if let Some(raw_target) = self.config.get_external_route(domain) {
            let target = parse_external_target(domain, &raw_target)?;
            self.cache
                .insert(domain.to_string(), CachedTarget::new(target.clone()));
            return Ok(target);
        }

        let route = self
            .config
            .get_route(domain)
            .ok_or_else(|| ResolverError::NoRoute(domain.to_string()))?;

        let container = self
            .runtime
            .find_by_name(&route_container_name(&route.domain))
            .await?
            .ok_or_else(|| ResolverError::Unreachable(domain.to_string()))?;

        let network = preferred_network(&container.networks)
            .ok_or_else(|| ResolverError::Unreachable(domain.to_string()))?;

        let ports = http_priority_order(container.exposed_ports.clone());
        let port = ports
            .first()
            .copied()
            .or(container.host_port)
            .ok_or_else(|| ResolverError::Unreachable(domain.to_string()))?;

        // The container-facing hop is always plain HTTP (§4.4): `https` on
        // the route only controls whether the edge listener terminates TLS
        // for public traffic, which is out of scope here (§1) — containers
        // are addressed over the internal network, not re-encrypted to.
        let _ = route.https;
        let target = ResolvedTarget {
            container_name: container.name,
            ip_address: network.ip_address.clone(),
            port,
        };

        self.cache
            .insert(domain.to_string(), CachedTarget::new(target.clone()));
        Ok(target)
    }

    pub fn invalidate(&self, domain: &str) {
        self.cache.remove(domain);
    }
}

/// Gordon derives container names deterministically from the route
/// domain so the resolver never has to store an ID, only the domain.
pub fn route_container_name(domain: &str) -> String {
    format!("gordon-{}", domain.replace('.', "-"))
}

/// Parse an `[external_routes]` value (`host:port`) into a resolved
/// target. These never carry a container name or a TLS-upstream flag —
/// the config author is naming a plain TCP endpoint, not a Gordon-managed
/// container.
fn parse_external_target(domain: &str, raw: &str) -> Result<ResolvedTarget, ResolverError> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| ResolverError::Unreachable(domain.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ResolverError::Unreachable(domain.to_string()))?;
    Ok(ResolvedTarget {
        container_name: format!("external:{domain}"),
        ip_address: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::{ContainerConfig, ContainerInfo, ContainerState, NetworkInfo, RuntimeError};
    use crate::infrastructure::event_bus::EventBus;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        containers: Mutex<HashMap<String, ContainerInfo>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn healthcheck(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn pull_image(&self, _image: &str, _auth: Option<&crate::domain::runtime::RegistryAuth>) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn inspect_image(&self, _image: &str) -> Result<crate::domain::runtime::ImageMetadata, RuntimeError> {
            Ok(crate::domain::runtime::ImageMetadata::default())
        }
        async fn create_container(&self, _config: ContainerConfig) -> Result<String, RuntimeError> {
            Ok("fake-id".into())
        }
        async fn start_container(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn stop_container(&self, _id: &str, _timeout_secs: u64) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn remove_container(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
            self.containers
                .lock()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
        }
        async fn find_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
            Ok(self.containers.lock().await.get(name).cloned())
        }
        async fn create_volume(&self, _name: &str, _labels: HashMap<String, String>) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn volume_exists(&self, _name: &str) -> Result<bool, RuntimeError> {
            Ok(false)
        }
        async fn http_probe(&self, _host_port: u16, _path: &str, _timeout_ms: u64) -> Result<u16, RuntimeError> {
            Ok(200)
        }
        async fn stream_logs(
            &self,
            _name_or_id: &str,
            _tail_lines: u32,
            _follow: bool,
        ) -> Result<futures::stream::BoxStream<'static, Result<String, RuntimeError>>, RuntimeError> {
            Ok(futures::stream::empty().boxed())
        }
    }

    fn sample_container(name: &str) -> ContainerInfo {
        ContainerInfo {
            id: "abc123".into(),
            name: name.into(),
            image: "web:1".into(),
            state: ContainerState::Running,
            networks: vec![NetworkInfo {
                network_name: "gordon-app".into(),
                ip_address: "10.0.0.5".into(),
            }],
            exposed_ports: vec![8080],
            host_port: Some(32768),
        }
    }

    #[tokio::test]
    async fn resolves_route_to_container_address() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path().join("gordon.toml"), EventBus::new()).unwrap();
        config.add_route("app.example.com", "web:1").unwrap();

        let runtime = Arc::new(FakeRuntime::default());
        let name = route_container_name("app.example.com");
        runtime
            .containers
            .lock()
            .await
            .insert(name.clone(), sample_container(&name));

        let resolver = RouteResolver::new(config, runtime);
        let target = resolver.resolve("app.example.com").await.unwrap();
        assert_eq!(target.ip_address, "10.0.0.5");
        assert_eq!(target.port, 8080);
    }

    #[tokio::test]
    async fn external_route_bypasses_container_lookup() {
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
        let config = ConfigStore::load(&path, EventBus::new()).unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let resolver = RouteResolver::new(config, runtime);

        let target = resolver.resolve("reg.example.com").await.unwrap();
        assert_eq!(target.ip_address, "localhost");
        assert_eq!(target.port, 5000);
    }

    #[tokio::test]
    async fn unknown_domain_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path().join("gordon.toml"), EventBus::new()).unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let resolver = RouteResolver::new(config, runtime);

        let result = resolver.resolve("missing.example.com").await;
        assert!(matches!(result, Err(ResolverError::NoRoute(_))));
    }

    #[tokio::test]
    async fn event_invalidates_cached_entry() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let config = ConfigStore::load(dir.path().join("gordon.toml"), bus.clone()).unwrap();
        config.add_route("app.example.com", "web:1").unwrap();

        let runtime = Arc::new(FakeRuntime::default());
        let name = route_container_name("app.example.com");
        runtime
            .containers
            .lock()
            .await
            .insert(name.clone(), sample_container(&name));

        let resolver = RouteResolver::new(config.clone(), runtime.clone());
        resolver.spawn_invalidation_listener(&bus);
        resolver.resolve("app.example.com").await.unwrap();
        assert!(resolver.cache.contains_key("app.example.com"));

        config.remove_route("app.example.com").unwrap();
        // allow the spawned listener task to observe the event
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!resolver.cache.contains_key("app.example.com"));
    }
}
