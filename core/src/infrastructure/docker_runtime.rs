//! Docker-backed [`ContainerRuntime`]. Connects to the daemon over the
//! local Unix socket (or a configured path), creates containers attached
//! to a `gordon-*` network by default, and probes readiness with a plain
//! HTTP GET against the container's published host port.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::auth::DockerCredentials;
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, PortBinding as BollardPortBinding};
use bollard::volume::CreateVolumeOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::info;

use crate::domain::runtime::{
    ContainerConfig, ContainerInfo, ContainerRuntime, ContainerState, ImageMetadata, NetworkInfo, RegistryAuth,
    RuntimeError,
};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(socket_path: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match socket_path {
            #[cfg(unix)]
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?,
            #[cfg(not(unix))]
            Some(_) => Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?,
        };
        Ok(DockerRuntime { docker })
    }

    fn state_of(status: &str) -> ContainerState {
        match status {
            "running" => ContainerState::Running,
            "exited" | "dead" | "created" => ContainerState::Stopped,
            "paused" => ContainerState::Paused,
            _ => ContainerState::Unknown,
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image, "pulling image");
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        let credentials = auth.map(|a| DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server_address.clone(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| RuntimeError::PullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageMetadata, RuntimeError> {
        let details = self
            .docker
            .inspect_image(image)
            .await
            .map_err(|e| RuntimeError::NotFound(format!("{image}: {e}")))?;

        let config = details.config;
        let env = config.as_ref().and_then(|c| c.env.clone()).unwrap_or_default();
        let exposed_ports = config
            .as_ref()
            .and_then(|c| c.exposed_ports.as_ref())
            .map(|ports| {
                ports
                    .keys()
                    .filter_map(|key| key.split('/').next()?.parse::<u16>().ok())
                    .collect()
            })
            .unwrap_or_default();
        let volumes = config
            .as_ref()
            .and_then(|c| c.volumes.as_ref())
            .map(|vols| vols.keys().cloned().collect())
            .unwrap_or_default();

        Ok(ImageMetadata {
            env,
            exposed_ports,
            volumes,
        })
    }

    async fn create_container(&self, config: ContainerConfig) -> Result<String, RuntimeError> {
        let env_vars: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let binds: Vec<String> = config
            .volumes
            .iter()
            .map(|v| format!("{}:{}", v.volume_name, v.container_path))
            .collect();

        let mut port_bindings = HashMap::new();
        let mut exposed_ports = HashMap::new();
        if let Some(port) = config.exposed_port {
            let key = format!("{port}/tcp");
            // No host IP is bound (never 0.0.0.0): an empty host_ip plus an
            // empty host_port asks Docker to allocate an ephemeral port on
            // all loopback-reachable interfaces, matching the deployment
            // orchestrator's "bind an ephemeral host port" step.
            port_bindings.insert(
                key.clone(),
                Some(vec![BollardPortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            network_mode: config.network.clone(),
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            publish_all_ports: Some(false),
            ..Default::default()
        };

        let labels: HashMap<String, String> = config.labels.clone();

        let container_config = Config {
            image: Some(config.image.clone()),
            env: Some(env_vars),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            labels: Some(labels),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| RuntimeError::CreateFailed(e.to_string()))?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| RuntimeError::StartFailed(e.to_string()))
    }

    async fn stop_container(&self, id: &str, timeout_secs: u64) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| RuntimeError::StopFailed(e.to_string()))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| RuntimeError::RemoveFailed(e.to_string()))
    }

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        let details = self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
            .map_err(|_| RuntimeError::NotFound(name_or_id.to_string()))?;

        let status_text = details
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let state = Self::state_of(&status_text);

        let networks = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .map(|nets| {
                nets.iter()
                    .map(|(name, settings)| NetworkInfo {
                        network_name: name.clone(),
                        ip_address: settings.ip_address.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let host_port = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .and_then(|ports| ports.values().flatten().next())
            .and_then(|bindings| bindings.first())
            .and_then(|b| b.host_port.as_ref())
            .and_then(|p| p.parse::<u16>().ok());

        let exposed_ports = details
            .config
            .as_ref()
            .and_then(|c| c.exposed_ports.as_ref())
            .map(|ports| {
                ports
                    .keys()
                    .filter_map(|key| key.split('/').next()?.parse::<u16>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContainerInfo {
            id: details.id.unwrap_or_default(),
            name: details.name.unwrap_or_default().trim_start_matches('/').to_string(),
            image: details.config.and_then(|c| c.image).unwrap_or_default(),
            state,
            networks,
            exposed_ports,
            host_port,
        })
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{name}$")]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;

        match containers.first() {
            Some(_) => self.inspect(name).await.map(Some),
            None => Ok(None),
        }
    }

    async fn create_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<(), RuntimeError> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            labels,
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map_err(|e| RuntimeError::CreateFailed(e.to_string()))?;
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.docker.inspect_volume(name).await.is_ok())
    }

    async fn http_probe(&self, host_port: u16, path: &str, timeout_ms: u64) -> Result<u16, RuntimeError> {
        let url = format!("http://127.0.0.1:{host_port}{path}");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;
        Ok(response.status().as_u16())
    }

    async fn stream_logs(
        &self,
        name_or_id: &str,
        tail_lines: u32,
        follow: bool,
    ) -> Result<futures::stream::BoxStream<'static, Result<String, RuntimeError>>, RuntimeError> {
        let options = bollard::container::LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow,
            tail: tail_lines.to_string(),
            timestamps: false,
            ..Default::default()
        };
        let stream = self
            .docker
            .logs(name_or_id, Some(options))
            .map(|chunk| {
                chunk
                    .map(|output| output.to_string())
                    .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))
            })
            .boxed();
        Ok(stream)
    }
}
