//! Top-level HTTP surfaces. Gordon binds two listeners: the admin API
//! (loopback by default) and the reverse proxy (the public-facing
//! listener routing by `Host` header). Keeping them as separate `Router`s
//! means a misconfigured public listener can never reach admin routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::any;
use axum::Router;

use crate::application::GordonServices;
use crate::infrastructure::admin;
use crate::infrastructure::proxy::{proxy_handler, ProxyState};

pub fn admin_router(services: Arc<GordonServices>) -> Router {
    let state = Arc::new(admin::server::AdminState {
        config: services.config.clone(),
        secrets: services.secrets.clone(),
        runtime: services.runtime.clone(),
        deploy: services.deploy.clone(),
        auth: services.auth.clone(),
        events: services.events.clone(),
        process_logs: services.process_logs.clone(),
    });
    admin::server::router(state)
}

pub fn proxy_router(services: Arc<GordonServices>) -> Router {
    let state = ProxyState::new(services.resolver.clone());
    Router::new().fallback(any(proxy_handler)).with_state(state)
}

/// Serve `router` on `addr`, propagating the client's real socket address
/// into request extensions (the proxy uses it for `X-Forwarded-For`).
pub async fn serve(router: Router, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
