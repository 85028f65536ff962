//! Stable error taxonomy shared across the config store, secret store,
//! resolver, proxy and admin service. Each variant is a "kind" per the
//! error-handling design: callers match on kind to decide retry/rollback
//! behavior rather than on message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("route domain must not be empty")]
    RouteDomainEmpty,

    #[error("route image must not be empty")]
    RouteImageEmpty,

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("attachment already has image {image:?} on {target:?}")]
    AttachmentExists { target: String, image: String },

    #[error("attachment not found: {target:?} / {image:?}")]
    AttachmentNotFound { target: String, image: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid environment key: {0}")]
    InvalidEnvKey(String),

    #[error("path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("secret backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("secret backend busy: {0}")]
    BackendBusy(String),

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SecretError {
    fn from(e: std::io::Error) -> Self {
        SecretError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no route for domain: {0}")]
    NoRoute(String),

    #[error("container runtime error: {0}")]
    Runtime(#[from] crate::domain::runtime::RuntimeError),

    #[error("no reachable network/port for domain: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("token expired")]
    TokenExpired,

    #[error("insufficient scope: needed {0}")]
    InsufficientScope(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("deployment cancelled")]
    Cancelled,

    #[error("container already exists: {0}")]
    ContainerAlreadyExists(String),

    #[error(transparent)]
    Runtime(#[from] crate::domain::runtime::RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("client error ({status}): {body}")]
    ClientRejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Transport/5xx failures are retryable; validation (4xx) never is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout | ClientError::BackendUnavailable(_) | ClientError::ServerError { .. }
        )
    }
}
