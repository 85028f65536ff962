//! `ContainerRuntime` — the capability seam between Gordon and the
//! concrete container engine. This module defines the trait its callers
//! (the resolver, the deployment orchestrator) are written against, plus
//! the value types that cross that seam. [`infrastructure::docker_runtime`]
//! is the production implementation backed by the Docker API.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A container's attachment to one Docker network, as observed from the
/// runtime — the resolver never owns this, only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network_name: String,
    pub ip_address: String,
}

/// Declarative request to create a container for a route or attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub network: Option<String>,
    /// Container port to publish to an ephemeral host port (never 0.0.0.0,
    /// see §4.6 step 7).
    pub exposed_port: Option<u16>,
    pub volumes: Vec<VolumeBind>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBind {
    pub volume_name: String,
    pub container_path: String,
}

/// Registry credentials attached to a `pull_image` call when configured
/// (§4.6 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server_address: Option<String>,
}

/// What an image declares about itself, read from its manifest/config
/// before a container is created from it (§4.6 steps 5-6): `ENV`
/// directives, `EXPOSE`d ports, and declared `VOLUME` mount points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Raw `ENV` directives in `KEY=VALUE` form, in the order the image
    /// declares them.
    pub env: Vec<String>,
    pub exposed_ports: Vec<u16>,
    /// Container-side paths declared by `VOLUME`.
    pub volumes: Vec<String>,
}

/// Observed state of a running (or stopped) container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub networks: Vec<NetworkInfo>,
    pub exposed_ports: Vec<u16>,
    /// Host-side ephemeral port bound for the container's primary exposed
    /// port, if the container was created by Gordon's deploy orchestrator.
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    Unknown,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },

    #[error("failed to create container: {0}")]
    CreateFailed(String),

    #[error("failed to start container: {0}")]
    StartFailed(String),

    #[error("failed to stop container: {0}")]
    StopFailed(String),

    #[error("failed to remove container: {0}")]
    RemoveFailed(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("runtime backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Ports in the order the resolver and deployment orchestrator should
/// prefer them when more than one is exposed (§4.4, §4.6): common HTTP
/// ports first, then ascending, with port 22 always last.
pub fn http_priority_order(mut ports: Vec<u16>) -> Vec<u16> {
    const PRIORITY: &[u16] = &[80, 443, 8080, 3000, 8000, 5000, 9000];

    ports.sort_by_key(|p| {
        if *p == 22 {
            (2u8, *p)
        } else if let Some(rank) = PRIORITY.iter().position(|pp| pp == p) {
            (0u8, rank as u16)
        } else {
            (1u8, *p)
        }
    });
    ports
}

/// Network preference order for picking a container's IP: `gordon-*`
/// networks first, then `bridge`, then whatever remains in the order
/// reported by the runtime.
pub fn preferred_network<'a>(networks: &'a [NetworkInfo]) -> Option<&'a NetworkInfo> {
    networks
        .iter()
        .find(|n| n.network_name.starts_with("gordon-"))
        .or_else(|| networks.iter().find(|n| n.network_name == "bridge"))
        .or_else(|| networks.first())
}

/// The capability Gordon's deployment orchestrator and route resolver are
/// written against. A production implementation wraps the Docker API
/// (bollard); tests substitute an in-memory fake.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Confirm the backend itself is reachable, independent of any
    /// particular container. Used by `GetHealth`.
    async fn healthcheck(&self) -> Result<(), RuntimeError>;

    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<(), RuntimeError>;

    /// Read back an already-pulled image's declared `ENV`/`EXPOSE`/
    /// `VOLUME` directives, used by the deployment orchestrator to derive
    /// the container's default env, port and volume set (§4.6 steps 5-6).
    async fn inspect_image(&self, image: &str) -> Result<ImageMetadata, RuntimeError>;

    async fn create_container(&self, config: ContainerConfig) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str, timeout_secs: u64) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Inspect a container by name (Gordon derives container names from
    /// domains, so lookups are always by the deterministic name, never by
    /// a stored ID) or by ID.
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError>;

    async fn create_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<(), RuntimeError>;

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    /// `GET /` against the container's bound host port with the supplied
    /// deadline, used by the deployment orchestrator's readiness poll
    /// (§4.6 step 8) and by `GetHealth`.
    async fn http_probe(&self, host_port: u16, path: &str, timeout_ms: u64) -> Result<u16, RuntimeError>;

    /// Stream a container's log output, most recent `tail_lines` first,
    /// continuing to yield new lines as they're written when `follow` is
    /// set. Backs `GetContainerLogs` (§4.5).
    async fn stream_logs(
        &self,
        name_or_id: &str,
        tail_lines: u32,
        follow: bool,
    ) -> Result<BoxStream<'static, Result<String, RuntimeError>>, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_priority_orders_common_ports_first() {
        let ports = http_priority_order(vec![22, 9999, 443, 80, 5000]);
        assert_eq!(ports, vec![80, 443, 5000, 9999, 22]);
    }

    #[test]
    fn preferred_network_prefers_gordon_prefix() {
        let nets = vec![
            NetworkInfo { network_name: "bridge".into(), ip_address: "172.17.0.2".into() },
            NetworkInfo { network_name: "gordon-app".into(), ip_address: "10.0.0.5".into() },
        ];
        let picked = preferred_network(&nets).unwrap();
        assert_eq!(picked.network_name, "gordon-app");
    }

    #[test]
    fn preferred_network_falls_back_to_bridge_then_first() {
        let nets = vec![NetworkInfo { network_name: "bridge".into(), ip_address: "172.17.0.2".into() }];
        assert_eq!(preferred_network(&nets).unwrap().network_name, "bridge");

        let nets = vec![NetworkInfo { network_name: "custom".into(), ip_address: "10.1.1.1".into() }];
        assert_eq!(preferred_network(&nets).unwrap().network_name, "custom");

        let nets: Vec<NetworkInfo> = vec![];
        assert!(preferred_network(&nets).is_none());
    }
}
