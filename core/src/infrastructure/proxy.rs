//! The reverse proxy: resolves the inbound `Host` header to a container
//! address via [`RouteResolver`] and forwards the request, stripping
//! hop-by-hop headers and adding the standard `X-Forwarded-*` trio.
//! Streaming responses (notably SSE log tails) are forwarded chunk by
//! chunk rather than buffered, so they pass through unmodified.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};

use crate::domain::errors::ResolverError;
use crate::infrastructure::resolver::RouteResolver;

/// Deadline for connecting and receiving the response head (§4.4: "30s
/// read, 30s write"). Applied up front with [`tokio::time::timeout`]
/// rather than `reqwest::Client::timeout`, since the latter would also
/// bound body streaming — which must stay unbounded for SSE.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that apply only to a single hop and must never be forwarded
/// (RFC 7230 §6.1), plus `Host` itself which the upstream must see as its
/// own.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

pub struct ProxyState {
    resolver: Arc<RouteResolver>,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(resolver: Arc<RouteResolver>) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client configuration is static and always valid");
        Arc::new(ProxyState { resolver, client })
    }
}

/// Bound a response body stream by idle time between chunks rather than
/// total duration, so a slow-but-alive upstream isn't cut off mid-response.
/// SSE responses skip this wrapper entirely (§4.4: unbounded for
/// `text/event-stream`).
fn bound_idle<S>(inner: S, idle_timeout: Duration) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    futures::stream::unfold((Box::pin(inner), false), move |(mut inner, done)| async move {
        if done {
            return None;
        }
        match tokio::time::timeout(idle_timeout, inner.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), (inner, false))),
            Ok(Some(Err(e))) => Some((Err(std::io::Error::other(e)), (inner, true))),
            Ok(None) => None,
            Err(_) => Some((
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream read timed out")),
                (inner, true),
            )),
        }
    })
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

fn host_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::HOST)?.to_str().ok()?;
    Some(raw.split(':').next().unwrap_or(raw).to_string())
}

fn compose_forwarded_for(existing: Option<&str>, client_ip: &str) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip.to_string(),
    }
}

pub async fn proxy_handler(
    State(state): State<Arc<ProxyState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(domain) = host_from_headers(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Host header").into_response();
    };

    // No route at all is a client-facing 404; a route that exists but
    // whose container can't currently be reached is a 502 — the caller
    // asked for something real, the failure is ours. Either way the
    // underlying reason stays in the log, never the response body (§4.4).
    let target = match state.resolver.resolve(&domain).await {
        Ok(target) => target,
        Err(e @ ResolverError::NoRoute(_)) => {
            tracing::debug!(domain, error = %e, "proxy: no route for host");
            return (StatusCode::NOT_FOUND, "no route for this host").into_response();
        }
        Err(e) => {
            tracing::warn!(domain, error = %e, "proxy: failed to resolve target");
            return (StatusCode::BAD_GATEWAY, "upstream target unavailable").into_response();
        }
    };

    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let upstream_url = format!("{}{}", target.base_url(), path_and_query);

    let mut upstream_headers = strip_hop_by_hop(&headers);
    upstream_headers.insert(
        HeaderName::from_static("x-forwarded-host"),
        HeaderValue::from_str(&domain).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    upstream_headers.insert(
        HeaderName::from_static("x-forwarded-proto"),
        HeaderValue::from_static("https"),
    );

    // Append rather than overwrite: a request that already passed through
    // an upstream proxy carries a prior hop's IP in this header, and the
    // chain must be preserved.
    let client_ip = peer.ip().to_string();
    let forwarded_for = compose_forwarded_for(
        headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
        &client_ip,
    );
    upstream_headers.insert(
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(&forwarded_for).unwrap_or_else(|_| HeaderValue::from_static("")),
    );

    let upstream_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return (StatusCode::BAD_REQUEST, "unsupported method").into_response(),
    };

    let request_body_stream = body.into_data_stream().map(|chunk| chunk.map_err(std::io::Error::other));
    let request = state
        .client
        .request(upstream_method, &upstream_url)
        .headers(upstream_headers)
        .body(reqwest::Body::wrap_stream(request_body_stream));

    let upstream_response = match tokio::time::timeout(REQUEST_TIMEOUT, request.send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::warn!(domain, error = %e, "upstream request failed");
            return (StatusCode::BAD_GATEWAY, format!("upstream unreachable: {e}")).into_response();
        }
        Err(_) => {
            tracing::warn!(domain, "upstream request timed out");
            return (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out").into_response();
        }
    };

    let status = upstream_response.status();
    let response_headers = strip_hop_by_hop(upstream_response.headers());
    let sse = is_event_stream(&response_headers);
    let raw = upstream_response.bytes_stream();

    let body = if sse {
        Body::from_stream(raw.map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string()))))
    } else {
        Body::from_stream(bound_idle(raw, REQUEST_TIMEOUT))
    };

    let mut response = Response::builder()
        .status(status.as_u16())
        .body(body)
        .expect("status and streamed body always produce a valid response");
    *response.headers_mut() = response_headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, HeaderValue::from_static("app.example.com"));
        headers.insert(axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let stripped = strip_hop_by_hop(&headers);
        assert!(!stripped.contains_key(axum::http::header::HOST));
        assert!(!stripped.contains_key(axum::http::header::CONNECTION));
        assert!(stripped.contains_key(axum::http::header::CONTENT_TYPE));
    }

    #[test]
    fn extracts_bare_host_without_port() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, HeaderValue::from_static("app.example.com:8443"));
        assert_eq!(host_from_headers(&headers).as_deref(), Some("app.example.com"));
    }

    #[test]
    fn forwarded_for_appends_to_existing_chain() {
        assert_eq!(compose_forwarded_for(Some("10.0.0.1"), "10.0.0.2"), "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn forwarded_for_starts_fresh_chain_when_absent() {
        assert_eq!(compose_forwarded_for(None, "10.0.0.2"), "10.0.0.2");
        assert_eq!(compose_forwarded_for(Some(""), "10.0.0.2"), "10.0.0.2");
    }
}
