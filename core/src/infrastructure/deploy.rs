//! The deployment orchestrator (§4.6): given a domain and an image,
//! resolves a naming conflict with any existing container, pulls the
//! image (attaching registry credentials when configured), extracts its
//! declared ports/env/volumes, merges in the domain's and its
//! attachments' secrets, creates and starts the container, and polls it
//! for readiness before publishing a `ContainerStarted` event. Any
//! failure after the container is created triggers cleanup so a
//! half-deployed container never lingers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::domain::errors::DeployError;
use crate::domain::events::GordonEvent;
use crate::domain::runtime::{
    http_priority_order, ContainerConfig, ContainerRuntime, ContainerState, RegistryAuth, RuntimeError, VolumeBind,
};
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::resolver::route_container_name;
use crate::infrastructure::secret_store::DomainSecretStore;

const HEALTH_POLL_ATTEMPTS: u32 = 20;
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);
const HEALTH_PROBE_TIMEOUT_MS: u64 = 2000;
const GRACEFUL_STOP_SECS: u64 = 30;

/// What to do when a container already occupies the name Gordon would
/// create for this domain. The admin API and CLI surface this as an
/// explicit choice rather than prompting themselves — only the CLI's
/// interactive path resolves an ambiguous `deploy` invocation into one of
/// these before calling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Fail,
    Replace,
    ReuseIfRunning,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub domain: String,
    pub image: String,
    /// Overrides the port picked from the image's `EXPOSE`d ports when
    /// set; otherwise the highest-priority exposed port is used (§4.6
    /// step 5).
    pub exposed_port: Option<u16>,
    pub network: Option<String>,
    pub conflict: ConflictPolicy,
}

#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub container_name: String,
    pub container_id: String,
    pub host_port: Option<u16>,
    pub reused: bool,
}

pub struct DeployOrchestrator {
    config: Arc<ConfigStore>,
    runtime: Arc<dyn ContainerRuntime>,
    secrets: Arc<dyn DomainSecretStore>,
    events: EventBus,
}

impl DeployOrchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        runtime: Arc<dyn ContainerRuntime>,
        secrets: Arc<dyn DomainSecretStore>,
        events: EventBus,
    ) -> Self {
        DeployOrchestrator {
            config,
            runtime,
            secrets,
            events,
        }
    }

    /// §4.6 step 7: `gordon-<domain>` when network isolation is enabled,
    /// else `None` so the runtime falls back to its own configured
    /// default network.
    fn default_network(&self, domain: &str) -> Option<String> {
        let isolation = self.config.settings().network_isolation;
        if !isolation.enabled {
            return None;
        }
        Some(format!("{}-{}", isolation.network_prefix, sanitize_domain_for_name(domain)))
    }

    fn registry_auth(&self) -> Option<RegistryAuth> {
        let registry = self.config.settings().registry_auth;
        let username = registry.username?;
        let password = registry.password?;
        Some(RegistryAuth {
            username,
            password,
            server_address: registry.server_address,
        })
    }

    pub async fn deploy(&self, req: DeployRequest) -> Result<DeployOutcome, DeployError> {
        let name = route_container_name(&req.domain);

        if let Some(existing) = self.runtime.find_by_name(&name).await? {
            match req.conflict {
                ConflictPolicy::Fail => return Err(DeployError::ContainerAlreadyExists(name)),
                ConflictPolicy::ReuseIfRunning => {
                    if existing.state != ContainerState::Running {
                        self.runtime.start_container(&existing.id).await?;
                    }
                    self.events.publish(GordonEvent::ContainerStarted { name: name.clone() });
                    return Ok(DeployOutcome {
                        container_name: name,
                        container_id: existing.id,
                        host_port: existing.host_port,
                        reused: true,
                    });
                }
                ConflictPolicy::Replace => {
                    let _ = self.runtime.stop_container(&existing.id, GRACEFUL_STOP_SECS).await;
                    self.runtime.remove_container(&existing.id).await?;
                }
                ConflictPolicy::Cancel => return Err(DeployError::Cancelled),
            }
        }

        let auth = self.registry_auth();
        self.runtime.pull_image(&req.image, auth.as_ref()).await?;
        let image_meta = self.runtime.inspect_image(&req.image).await?;

        let exposed_port = req
            .exposed_port
            .or_else(|| http_priority_order(image_meta.exposed_ports.clone()).into_iter().next());

        let volumes = self.prepare_volumes(&req.domain, &image_meta.volumes).await?;

        let env = self.merge_env(&req.domain, &image_meta.env).await?;

        let network = req.network.clone().or_else(|| self.default_network(&req.domain));

        let mut labels = HashMap::new();
        labels.insert("gordon.domain".to_string(), req.domain.clone());

        let config = ContainerConfig {
            name: name.clone(),
            image: req.image.clone(),
            env,
            network,
            exposed_port,
            volumes,
            labels,
        };

        let container_id = self.runtime.create_container(config).await?;

        if let Err(e) = self.runtime.start_container(&container_id).await {
            let _ = self.runtime.remove_container(&container_id).await;
            return Err(DeployError::Runtime(e));
        }

        let info = match self.runtime.inspect(&container_id).await {
            Ok(info) => info,
            Err(e) => {
                self.cleanup(&container_id).await;
                return Err(DeployError::Runtime(e));
            }
        };

        if let Some(port) = info.host_port {
            if !self.wait_until_healthy(port).await {
                self.cleanup(&container_id).await;
                return Err(DeployError::Runtime(RuntimeError::StartFailed(
                    "container did not become healthy before the deployment deadline".to_string(),
                )));
            }
        }

        self.events.publish(GordonEvent::ContainerStarted { name: name.clone() });

        Ok(DeployOutcome {
            container_name: name,
            container_id,
            host_port: info.host_port,
            reused: false,
        })
    }

    async fn wait_until_healthy(&self, host_port: u16) -> bool {
        for _ in 0..HEALTH_POLL_ATTEMPTS {
            if let Ok(200) = self.runtime.http_probe(host_port, "/", HEALTH_PROBE_TIMEOUT_MS).await {
                return true;
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
        false
    }

    async fn cleanup(&self, container_id: &str) {
        let _ = self.runtime.stop_container(container_id, GRACEFUL_STOP_SECS).await;
        let _ = self.runtime.remove_container(container_id).await;
    }

    /// §4.6 step 5: either create/reuse a managed volume per declared
    /// mount point, or skip declared volumes entirely when auto-create is
    /// disabled (the operator is expected to have provisioned them some
    /// other way).
    async fn prepare_volumes(&self, domain: &str, declared: &[String]) -> Result<Vec<VolumeBind>, DeployError> {
        let settings = self.config.settings().volumes;
        if !settings.auto_create {
            return Ok(Vec::new());
        }

        let mut binds = Vec::with_capacity(declared.len());
        for container_path in declared {
            let mut hasher = Sha256::new();
            hasher.update(container_path.as_bytes());
            let path_hash = hex::encode(hasher.finalize())[..12].to_string();
            let volume_name = format!("{}-{}-{}", settings.prefix, sanitize_domain_for_name(domain), path_hash);

            if !self.runtime.volume_exists(&volume_name).await? {
                let mut labels = HashMap::new();
                labels.insert("gordon.managed".to_string(), "true".to_string());
                self.runtime.create_volume(&volume_name, labels).await?;
            }

            binds.push(VolumeBind {
                volume_name,
                container_path: container_path.clone(),
            });
        }
        Ok(binds)
    }

    /// §4.6 step 6: image `ENV` directives form the base, the domain's
    /// own secret bundle overrides those, and each of its attachments'
    /// secret bundles override the domain bundle in turn.
    async fn merge_env(&self, domain: &str, image_env: &[String]) -> Result<HashMap<String, String>, DeployError> {
        let mut env = HashMap::new();
        for directive in image_env {
            if let Some((key, value)) = directive.split_once('=') {
                env.insert(key.to_string(), value.to_string());
            }
        }

        let domain_secrets = self.secrets.load_all(domain).await?;
        env.extend(domain_secrets.values);

        for image in self.config.list_attachments(domain) {
            let attachment_secrets = self.secrets.load_all(&image).await?;
            env.extend(attachment_secrets.values);
        }

        Ok(env)
    }
}

/// Matches [`route_container_name`]'s scheme so a domain's managed
/// volumes and isolated network share its container's naming convention.
fn sanitize_domain_for_name(domain: &str) -> String {
    domain.replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SecretError;
    use crate::domain::runtime::{ContainerInfo, NetworkInfo};
    use crate::domain::secret::{SecretKeys, SecretValues};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        containers: Mutex<HashMap<String, ContainerInfo>>,
        probe_status: Mutex<u16>,
        last_env: Mutex<HashMap<String, String>>,
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
            Ok(crate::domain::runtime::ImageMetadata {
                env: vec!["FROM_IMAGE=1".to_string()],
                exposed_ports: vec![8080],
                volumes: vec![],
            })
        }
        async fn create_container(&self, config: ContainerConfig) -> Result<String, RuntimeError> {
            *self.last_env.lock().await = config.env.clone();
            let info = ContainerInfo {
                id: format!("{}-id", config.name),
                name: config.name.clone(),
                image: config.image.clone(),
                state: ContainerState::Stopped,
                networks: vec![NetworkInfo {
                    network_name: "gordon-app".into(),
                    ip_address: "10.0.0.9".into(),
                }],
                exposed_ports: vec![8080],
                host_port: Some(32800),
            };
            let id = info.id.clone();
            self.containers.lock().await.insert(config.name, info);
            Ok(id)
        }
        async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
            let mut containers = self.containers.lock().await;
            if let Some(c) = containers.values_mut().find(|c| c.id == id) {
                c.state = ContainerState::Running;
            }
            Ok(())
        }
        async fn stop_container(&self, id: &str, _timeout_secs: u64) -> Result<(), RuntimeError> {
            let mut containers = self.containers.lock().await;
            if let Some(c) = containers.values_mut().find(|c| c.id == id) {
                c.state = ContainerState::Stopped;
            }
            Ok(())
        }
        async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
            self.containers.lock().await.retain(|_, c| c.id != id);
            Ok(())
        }
        async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
            self.containers
                .lock()
                .await
                .values()
                .find(|c| c.id == name_or_id || c.name == name_or_id)
                .cloned()
                .ok_or_else(|| RuntimeError::NotFound(name_or_id.to_string()))
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
            Ok(*self.probe_status.lock().await)
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

    #[derive(Default)]
    struct FakeSecretStore;

    #[async_trait]
    impl DomainSecretStore for FakeSecretStore {
        async fn set(&self, _owner: &str, _key: &str, _value: &str) -> Result<(), SecretError> {
            Ok(())
        }
        async fn get(&self, _owner: &str, _key: &str) -> Result<Option<String>, SecretError> {
            Ok(None)
        }
        async fn delete(&self, _owner: &str, _key: &str) -> Result<(), SecretError> {
            Ok(())
        }
        async fn list_keys(&self, _owner: &str) -> Result<SecretKeys, SecretError> {
            Ok(SecretKeys::default())
        }
        async fn load_all(&self, _owner: &str) -> Result<SecretValues, SecretError> {
            Ok(SecretValues::default())
        }
    }

    fn orchestrator(probe_status: u16) -> (DeployOrchestrator, Arc<FakeRuntime>) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path().join("gordon.toml"), EventBus::new()).unwrap();
        std::mem::forget(dir);
        let runtime = Arc::new(FakeRuntime::default());
        *runtime.probe_status.try_lock().unwrap() = probe_status;
        let orchestrator = DeployOrchestrator::new(config, runtime.clone(), Arc::new(FakeSecretStore), EventBus::new());
        (orchestrator, runtime)
    }

    #[tokio::test]
    async fn deploys_new_container_when_healthy() {
        let (orchestrator, _runtime) = orchestrator(200);
        let outcome = orchestrator
            .deploy(DeployRequest {
                domain: "app.example.com".into(),
                image: "web:1".into(),
                exposed_port: Some(8080),
                network: Some("gordon-app".into()),
                conflict: ConflictPolicy::Fail,
            })
            .await
            .unwrap();

        assert!(!outcome.reused);
        assert_eq!(outcome.host_port, Some(32800));
    }

    #[tokio::test]
    async fn conflict_fail_policy_rejects_existing_container() {
        let (orchestrator, runtime) = orchestrator(200);
        let name = route_container_name("app.example.com");
        runtime
            .create_container(ContainerConfig {
                name: name.clone(),
                image: "web:1".into(),
                env: HashMap::new(),
                network: None,
                exposed_port: None,
                volumes: vec![],
                labels: HashMap::new(),
            })
            .await
            .unwrap();

        let result = orchestrator
            .deploy(DeployRequest {
                domain: "app.example.com".into(),
                image: "web:2".into(),
                exposed_port: None,
                network: None,
                conflict: ConflictPolicy::Fail,
            })
            .await;
        assert!(matches!(result, Err(DeployError::ContainerAlreadyExists(_))));
    }

    #[tokio::test]
    async fn conflict_cancel_policy_aborts_without_touching_existing_container() {
        let (orchestrator, runtime) = orchestrator(200);
        let name = route_container_name("app.example.com");
        runtime
            .create_container(ContainerConfig {
                name: name.clone(),
                image: "web:1".into(),
                env: HashMap::new(),
                network: None,
                exposed_port: None,
                volumes: vec![],
                labels: HashMap::new(),
            })
            .await
            .unwrap();

        let result = orchestrator
            .deploy(DeployRequest {
                domain: "app.example.com".into(),
                image: "web:2".into(),
                exposed_port: None,
                network: None,
                conflict: ConflictPolicy::Cancel,
            })
            .await;
        assert!(matches!(result, Err(DeployError::Cancelled)));
        assert!(runtime.find_by_name(&name).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_container_is_cleaned_up() {
        let (orchestrator, runtime) = orchestrator(503);
        let deploy = orchestrator.deploy(DeployRequest {
            domain: "app.example.com".into(),
            image: "web:1".into(),
            exposed_port: Some(8080),
            network: None,
            conflict: ConflictPolicy::Fail,
        });
        tokio::pin!(deploy);
        let result = loop {
            tokio::select! {
                result = &mut deploy => break result,
                _ = tokio::time::advance(HEALTH_POLL_INTERVAL) => {}
            }
        };

        assert!(result.is_err());
        let name = route_container_name("app.example.com");
        assert!(runtime.find_by_name(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merges_image_env_then_domain_then_attachment_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path().join("gordon.toml"), EventBus::new()).unwrap();
        config.add_attachment("app.example.com", "redis:latest").unwrap();

        struct OverridingSecretStore;
        #[async_trait]
        impl DomainSecretStore for OverridingSecretStore {
            async fn set(&self, _owner: &str, _key: &str, _value: &str) -> Result<(), SecretError> {
                Ok(())
            }
            async fn get(&self, _owner: &str, _key: &str) -> Result<Option<String>, SecretError> {
                Ok(None)
            }
            async fn delete(&self, _owner: &str, _key: &str) -> Result<(), SecretError> {
                Ok(())
            }
            async fn list_keys(&self, _owner: &str) -> Result<SecretKeys, SecretError> {
                Ok(SecretKeys::default())
            }
            async fn load_all(&self, owner: &str) -> Result<SecretValues, SecretError> {
                let mut values = std::collections::BTreeMap::new();
                // Both bundles declare SHARED; the attachment bundle must
                // win since it's merged last (§4.6 step 6).
                if owner == "app.example.com" {
                    values.insert("SHARED".to_string(), "domain".to_string());
                    values.insert("DOMAIN_ONLY".to_string(), "domain".to_string());
                } else {
                    values.insert("SHARED".to_string(), "attachment".to_string());
                }
                Ok(SecretValues { values })
            }
        }

        let runtime = Arc::new(FakeRuntime::default());
        *runtime.probe_status.try_lock().unwrap() = 200;
        let orchestrator = DeployOrchestrator::new(
            config,
            runtime.clone(),
            Arc::new(OverridingSecretStore),
            EventBus::new(),
        );

        orchestrator
            .deploy(DeployRequest {
                domain: "app.example.com".into(),
                image: "web:1".into(),
                exposed_port: Some(8080),
                network: None,
                conflict: ConflictPolicy::Fail,
            })
            .await
            .unwrap();

        let env = runtime.last_env.lock().await.clone();
        assert_eq!(env.get("SHARED"), Some(&"attachment".to_string()));
        assert_eq!(env.get("DOMAIN_ONLY"), Some(&"domain".to_string()));
        assert_eq!(env.get("FROM_IMAGE"), Some(&"1".to_string()));
    }
}
