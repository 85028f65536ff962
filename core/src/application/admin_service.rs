//! `GordonServices` — the composition root binding the config store,
//! secret store, container runtime, route resolver, deployment
//! orchestrator and admin authenticator into the set of handles the
//! presentation layer and the CLI's embedded daemon command both need.
//! Building this is the one place that decides which secret-store backend
//! and which container runtime are active for a given daemon process.

use std::sync::Arc;

use crate::domain::runtime::ContainerRuntime;
use crate::infrastructure::admin::auth::AdminAuthenticator;
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::deploy::DeployOrchestrator;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::logs::ProcessLogBuffer;
use crate::infrastructure::resolver::RouteResolver;
use crate::infrastructure::secret_store::DomainSecretStore;

pub struct GordonServices {
    pub config: Arc<ConfigStore>,
    pub secrets: Arc<dyn DomainSecretStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub resolver: Arc<RouteResolver>,
    pub deploy: Arc<DeployOrchestrator>,
    pub auth: Arc<AdminAuthenticator>,
    pub events: EventBus,
    pub process_logs: ProcessLogBuffer,
}

impl GordonServices {
    /// Wire the services together and start the resolver's cache
    /// invalidation listener and the config store's filesystem watcher.
    /// Returns the watcher handle alongside the services — callers must
    /// keep it alive for watching to continue.
    pub fn bootstrap(
        config: Arc<ConfigStore>,
        secrets: Arc<dyn DomainSecretStore>,
        runtime: Arc<dyn ContainerRuntime>,
        auth: Arc<AdminAuthenticator>,
        events: EventBus,
        process_logs: ProcessLogBuffer,
    ) -> Result<(Arc<Self>, notify::RecommendedWatcher), crate::domain::errors::ConfigError> {
        let resolver = RouteResolver::new(config.clone(), runtime.clone());
        resolver.spawn_invalidation_listener(&events);

        let deploy = Arc::new(DeployOrchestrator::new(
            config.clone(),
            runtime.clone(),
            secrets.clone(),
            events.clone(),
        ));

        let watcher = config.watch()?;

        let services = Arc::new(GordonServices {
            config,
            secrets,
            runtime,
            resolver,
            deploy,
            auth,
            events,
            process_logs,
        });
        Ok((services, watcher))
    }
}
