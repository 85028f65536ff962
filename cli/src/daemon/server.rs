//! Wires a loaded configuration into running admin and proxy listeners.
//! This is what `gordon daemon` (and `gordon --daemon`) ultimately calls.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gordon_core::application::GordonServices;
use gordon_core::infrastructure::admin::auth::AdminAuthenticator;
use gordon_core::infrastructure::config_store::ConfigStore;
use gordon_core::infrastructure::docker_runtime::DockerRuntime;
use gordon_core::infrastructure::event_bus::EventBus;
use gordon_core::infrastructure::logs::ProcessLogBuffer;
use gordon_core::infrastructure::secret_store::external_store::{ExternalSecretStore, SubprocessCredentialManager};
use gordon_core::infrastructure::secret_store::file_store::FileSecretStore;
use gordon_core::infrastructure::secret_store::DomainSecretStore;
use gordon_core::presentation::api;

pub enum SecretBackend {
    File,
    External { credential_manager_binary: PathBuf },
}

pub struct DaemonConfig {
    pub admin_addr: SocketAddr,
    pub proxy_addr: SocketAddr,
    pub gordon_toml_path: PathBuf,
    pub data_dir: PathBuf,
    pub docker_socket: Option<String>,
    pub jwt_secret: Vec<u8>,
    pub admin_password_sha256: String,
    pub secret_backend: SecretBackend,
    pub process_logs: ProcessLogBuffer,
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    let events = EventBus::new();
    let store = ConfigStore::load(&config.gordon_toml_path, events.clone())
        .context("failed to load gordon.toml")?;

    let runtime = Arc::new(
        DockerRuntime::connect(config.docker_socket.as_deref()).context("failed to connect to Docker")?,
    );
    runtime.healthcheck().await.context("Docker daemon is not reachable")?;

    let secrets: Arc<dyn DomainSecretStore> = match config.secret_backend {
        SecretBackend::File => Arc::new(FileSecretStore::new(config.data_dir.join("secrets"))),
        SecretBackend::External {
            credential_manager_binary,
        } => Arc::new(ExternalSecretStore::new(
            Arc::new(SubprocessCredentialManager::new(credential_manager_binary)),
            config.data_dir.join("secrets"),
        )),
    };

    let auth = Arc::new(AdminAuthenticator::new(&config.jwt_secret, config.admin_password_sha256));

    let (services, _watcher) =
        GordonServices::bootstrap(store, secrets, runtime, auth, events, config.process_logs)
            .context("failed to bootstrap Gordon services")?;

    let admin_router = api::admin_router(services.clone());
    let proxy_router = api::proxy_router(services);

    tracing::info!(admin = %config.admin_addr, proxy = %config.proxy_addr, "gordon daemon listening");

    tokio::select! {
        result = api::serve(admin_router, config.admin_addr) => {
            result.context("admin listener failed")
        }
        result = api::serve(proxy_router, config.proxy_addr) => {
            result.context("proxy listener failed")
        }
        _ = shutdown_signal() => {
            tracing::info!("gordon daemon shutting down");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
