//! The admin HTTP surface (§4.5): route/attachment/secret CRUD, deploy,
//! status/health, password-based token issuance, and an SSE endpoint
//! relaying the internal event stream to connected clients. Every
//! handler but `/auth/password` and `/health` requires a bearer token
//! carrying the scope the operation needs.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::domain::auth::{Claims, Scope};
use crate::domain::errors::{AdminError, ConfigError, DeployError, ResolverError, SecretError};
use crate::domain::runtime::{ContainerRuntime, ContainerState};
use crate::infrastructure::admin::auth::AdminAuthenticator;
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::deploy::{ConflictPolicy, DeployOrchestrator, DeployRequest};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::logs::ProcessLogBuffer;
use crate::infrastructure::resolver::route_container_name;
use crate::infrastructure::secret_store::DomainSecretStore;

const DEFAULT_LOG_LINES: u32 = 200;
const MAX_LOG_LINES: u32 = 10_000;

pub struct AdminState {
    pub config: Arc<ConfigStore>,
    pub secrets: Arc<dyn DomainSecretStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub deploy: Arc<DeployOrchestrator>,
    pub auth: Arc<AdminAuthenticator>,
    pub events: EventBus,
    pub process_logs: ProcessLogBuffer,
}

pub fn router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/password", post(auth_password))
        .route("/auth/verify", get(verify_auth))
        .route("/status", get(status))
        .route("/config", get(get_config))
        .route("/reload", post(reload))
        .route("/routes", get(list_routes).post(add_route))
        .route("/routes/{domain}", get(get_route).put(update_route).delete(remove_route))
        .route("/restart/{domain}", post(restart_route))
        .route("/attachments/{target}", get(list_attachments).post(add_attachment))
        .route("/attachments/{target}/{image}", delete(remove_attachment))
        .route("/secrets/{owner}", get(list_secrets))
        .route("/secrets/{owner}/{key}", put(set_secret).delete(delete_secret))
        .route("/deploy", post(deploy))
        .route("/events", get(events_stream))
        .route("/logs", get(process_logs))
        .route("/logs/{domain}", get(container_logs))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bearer_claims(headers: &HeaderMap, auth: &AdminAuthenticator) -> Result<Claims, AdminError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AdminError::Unauthenticated)?;
    let token = raw.strip_prefix("Bearer ").ok_or(AdminError::Unauthenticated)?;
    auth.verify(token)
}

fn require(headers: &HeaderMap, state: &AdminState, scope: Scope) -> Result<Claims, AdminError> {
    let claims = bearer_claims(headers, &state.auth)?;
    AdminAuthenticator::require_scope(&claims, scope)?;
    Ok(claims)
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Unauthenticated | AdminError::TokenExpired => StatusCode::UNAUTHORIZED,
            AdminError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            AdminError::Config(ConfigError::RouteNotFound(_) | ConfigError::AttachmentNotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AdminError::Config(_) => StatusCode::BAD_REQUEST,
            AdminError::Secret(SecretError::NotFound(_)) => StatusCode::NOT_FOUND,
            AdminError::Secret(SecretError::InvalidEnvKey(_) | SecretError::PathTraversal(_)) => {
                StatusCode::BAD_REQUEST
            }
            AdminError::Secret(_) => StatusCode::BAD_GATEWAY,
            AdminError::Resolver(ResolverError::NoRoute(_)) => StatusCode::NOT_FOUND,
            AdminError::Resolver(_) => StatusCode::BAD_GATEWAY,
            AdminError::Deploy(DeployError::ContainerAlreadyExists(_)) => StatusCode::CONFLICT,
            AdminError::Deploy(DeployError::Cancelled) => StatusCode::CONFLICT,
            AdminError::Deploy(DeployError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            AdminError::Deploy(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn health(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    match state.runtime.healthcheck().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

#[derive(Deserialize)]
struct PasswordRequest {
    password: String,
}

async fn auth_password(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<PasswordRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    if !state.auth.verify_password(&req.password) {
        return Err(AdminError::Unauthenticated);
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let token = state
        .auth
        .issue("operator", vec![Scope::Admin], now)
        .map_err(|_| AdminError::Unauthenticated)?;
    Ok(Json(serde_json::json!({ "token": token.0 })))
}

async fn status(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
) -> Result<Json<serde_json::Value>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let settings = state.config.settings();
    Ok(Json(serde_json::json!({
        "routes": state.config.list_routes().len(),
        "registry_domain": settings.server.effective_registry_domain(),
        "registry_port": settings.server.registry_port,
        "server_port": settings.server.port,
        "auto_route": settings.auto_route.enabled,
        "network_isolation": settings.network_isolation.enabled,
    })))
}

async fn get_config(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
) -> Result<Json<serde_json::Value>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let settings = state.config.settings();
    Ok(Json(serde_json::json!({
        "server": {
            "port": settings.server.port,
            "registry_port": settings.server.registry_port,
            "registry_domain": settings.server.effective_registry_domain(),
        },
        "auto_route": { "enabled": settings.auto_route.enabled },
        "network_isolation": {
            "enabled": settings.network_isolation.enabled,
            "network_prefix": settings.network_isolation.network_prefix,
        },
        "auth": { "enabled": settings.auth.enabled },
        "volumes": {
            "auto_create": settings.volumes.auto_create,
            "prefix": settings.volumes.prefix,
            "preserve": settings.volumes.preserve,
        },
    })))
}

#[derive(Serialize)]
struct RouteView {
    domain: String,
    image: String,
    https: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    attachments: Vec<String>,
}

#[derive(Deserialize)]
struct ListRoutesParams {
    #[serde(default)]
    detailed: bool,
}

fn container_status_label(state: ContainerState) -> &'static str {
    match state {
        ContainerState::Running => "running",
        ContainerState::Stopped => "stopped",
        ContainerState::Paused => "paused",
        ContainerState::Unknown => "unknown",
    }
}

async fn list_routes(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Query(params): Query<ListRoutesParams>,
) -> Result<Json<Vec<RouteView>>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let mut views = Vec::new();
    for r in state.config.list_routes() {
        let attachments = state.config.list_attachments(&r.domain);
        let mut view = RouteView {
            domain: r.domain.clone(),
            image: r.image,
            https: r.https,
            container_id: None,
            container_status: None,
            network: None,
            attachments: if params.detailed { attachments } else { vec![] },
        };
        if params.detailed {
            let name = route_container_name(&r.domain);
            if let Ok(Some(info)) = state.runtime.find_by_name(&name).await {
                view.container_id = Some(info.id);
                view.container_status = Some(container_status_label(info.state));
                view.network = info.networks.first().map(|n| n.network_name.clone());
            }
        }
        views.push(view);
    }
    Ok(Json(views))
}

async fn get_route(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(domain): Path<String>,
) -> Result<Json<RouteView>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let route = state
        .config
        .get_route(&domain)
        .ok_or_else(|| AdminError::Config(ConfigError::RouteNotFound(domain.clone())))?;
    let attachments = state.config.list_attachments(&domain);
    let mut view = RouteView {
        domain: route.domain.clone(),
        image: route.image,
        https: route.https,
        container_id: None,
        container_status: None,
        network: None,
        attachments,
    };
    let name = route_container_name(&route.domain);
    if let Ok(Some(info)) = state.runtime.find_by_name(&name).await {
        view.container_id = Some(info.id);
        view.container_status = Some(container_status_label(info.state));
        view.network = info.networks.first().map(|n| n.network_name.clone());
    }
    Ok(Json(view))
}

#[derive(Deserialize)]
struct AddRouteRequest {
    domain: String,
    image: String,
}

async fn add_route(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Json(req): Json<AddRouteRequest>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.add_route(&req.domain, &req.image)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct UpdateRouteRequest {
    image: String,
}

async fn update_route(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(domain): Path<String>,
    Json(req): Json<UpdateRouteRequest>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.update_route(&domain, &req.image)?;
    Ok(StatusCode::OK)
}

async fn remove_route(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(domain): Path<String>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.remove_route(&domain)?;
    Ok(StatusCode::NO_CONTENT)
}

const RESTART_GRACE_SECS: u64 = 10;

async fn restart_route(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(domain): Path<String>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Deploy)?;
    state
        .config
        .get_route(&domain)
        .ok_or_else(|| AdminError::Config(ConfigError::RouteNotFound(domain.clone())))?;
    let name = route_container_name(&domain);
    let container = state
        .runtime
        .find_by_name(&name)
        .await
        .map_err(ResolverError::from)?
        .ok_or_else(|| ResolverError::Unreachable(domain.clone()))?;
    state
        .runtime
        .stop_container(&container.id, RESTART_GRACE_SECS)
        .await
        .map_err(ResolverError::from)?;
    state
        .runtime
        .start_container(&container.id)
        .await
        .map_err(ResolverError::from)?;
    Ok(StatusCode::OK)
}

async fn reload(headers: HeaderMap, State(state): State<Arc<AdminState>>) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.reload()?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
struct VerifyAuthResponse {
    valid: bool,
    subject: String,
    scopes: Vec<Scope>,
    expires_at: i64,
}

async fn verify_auth(headers: HeaderMap, State(state): State<Arc<AdminState>>) -> Result<Json<VerifyAuthResponse>, AdminError> {
    let claims = bearer_claims(&headers, &state.auth)?;
    Ok(Json(VerifyAuthResponse {
        valid: true,
        subject: claims.sub,
        scopes: claims.scopes,
        expires_at: claims.exp,
    }))
}

async fn list_attachments(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(target): Path<String>,
) -> Result<Json<Vec<String>>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    Ok(Json(state.config.list_attachments(&target)))
}

#[derive(Deserialize)]
struct AddAttachmentRequest {
    image: String,
}

async fn add_attachment(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(target): Path<String>,
    Json(req): Json<AddAttachmentRequest>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.add_attachment(&target, &req.image)?;
    Ok(StatusCode::CREATED)
}

async fn remove_attachment(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path((target, image)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.config.remove_attachment(&target, &image)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_secrets(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<String>>, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    let keys = state.secrets.list_keys(&owner).await?;
    Ok(Json(keys.keys))
}

#[derive(Deserialize)]
struct SetSecretRequest {
    value: String,
}

async fn set_secret(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path((owner, key)): Path<(String, String)>,
    Json(req): Json<SetSecretRequest>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.secrets.set(&owner, &key, &req.value).await?;
    Ok(StatusCode::OK)
}

async fn delete_secret(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path((owner, key)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    require(&headers, &state, Scope::Admin)?;
    state.secrets.delete(&owner, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// §4.6 step 2's caller-driven conflict choice, as it crosses the wire.
/// `fail` is the default so a script that omits the field entirely keeps
/// today's safe behavior rather than silently replacing a container.
#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum ConflictChoice {
    #[default]
    Fail,
    Replace,
    Reuse,
    Cancel,
}

impl From<ConflictChoice> for ConflictPolicy {
    fn from(choice: ConflictChoice) -> Self {
        match choice {
            ConflictChoice::Fail => ConflictPolicy::Fail,
            ConflictChoice::Replace => ConflictPolicy::Replace,
            ConflictChoice::Reuse => ConflictPolicy::ReuseIfRunning,
            ConflictChoice::Cancel => ConflictPolicy::Cancel,
        }
    }
}

#[derive(Deserialize)]
struct DeployRequestBody {
    domain: String,
    image: String,
    exposed_port: Option<u16>,
    network: Option<String>,
    #[serde(default)]
    conflict: ConflictChoice,
}

#[derive(Serialize)]
struct DeployResponse {
    container_name: String,
    host_port: Option<u16>,
    reused: bool,
}

async fn deploy(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Json(req): Json<DeployRequestBody>,
) -> Result<Json<DeployResponse>, AdminError> {
    require(&headers, &state, Scope::Deploy)?;
    let conflict = ConflictPolicy::from(req.conflict);
    let outcome = state
        .deploy
        .deploy(DeployRequest {
            domain: req.domain,
            image: req.image,
            exposed_port: req.exposed_port,
            network: req.network,
            conflict,
        })
        .await?;
    Ok(Json(DeployResponse {
        container_name: outcome.container_name,
        host_port: outcome.host_port,
        reused: outcome.reused,
    }))
}

#[derive(Deserialize)]
struct LogsParams {
    lines: Option<u32>,
    #[serde(default)]
    follow: bool,
}

/// Gordon's own process log tail (§4.5's `GetProcessLogs`), served from
/// the in-memory ring buffer rather than a log file the operator may not
/// have configured. With `follow=true` the stream stays open and relays
/// new lines as they're written.
async fn process_logs(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Query(params): Query<LogsParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let requested = params.lines.unwrap_or(DEFAULT_LOG_LINES).min(MAX_LOG_LINES) as usize;
    let tail = state.process_logs.tail(requested);
    let follow = params.follow;
    let live = state.process_logs.subscribe();

    let backlog = futures::stream::iter(tail.into_iter().map(|line| Ok(Event::default().data(line))));
    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = if follow {
        let live_stream = tokio_stream::wrappers::BroadcastStream::new(live)
            .filter_map(|item| async move { item.ok() })
            .map(|line| Ok(Event::default().data(line)));
        Box::pin(backlog.chain(live_stream))
    } else {
        Box::pin(backlog)
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// A route's container log tail (§4.5's `GetContainerLogs`), streamed
/// straight from the runtime rather than buffered, since container logs
/// can run arbitrarily large.
async fn container_logs(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
    Path(domain): Path<String>,
    Query(params): Query<LogsParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    state
        .config
        .get_route(&domain)
        .ok_or_else(|| AdminError::Config(ConfigError::RouteNotFound(domain.clone())))?;
    let name = route_container_name(&domain);
    let lines = params.lines.unwrap_or(DEFAULT_LOG_LINES).min(MAX_LOG_LINES);
    let log_stream = state
        .runtime
        .stream_logs(&name, lines, params.follow)
        .await
        .map_err(ResolverError::from)?;
    let stream = log_stream.filter_map(|item| async move { item.ok() }).map(|line| Ok(Event::default().data(line)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn events_stream(
    headers: HeaderMap,
    State(state): State<Arc<AdminState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AdminError> {
    require(&headers, &state, Scope::ReadOnly)?;
    let receiver = state.events.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        let payload = serde_json::to_string(&event).unwrap_or_default();
        Some((Ok(Event::default().data(payload)), receiver))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
