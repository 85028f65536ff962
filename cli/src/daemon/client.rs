//! `AdminClient` — the HTTP client every CLI subcommand but `daemon` uses
//! to talk to a running Gordon daemon. Retries transport failures and 5xx
//! responses with exponential backoff (250ms, doubling, capped at 5s, up
//! to 3 attempts); 4xx responses are never retried since retrying a
//! rejected request can't succeed without the caller changing it.

use std::time::Duration;

use futures::{Stream, StreamExt};
use gordon_core::domain::errors::ClientError;
use serde::de::DeserializeOwned;
use serde_json::Value;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;

pub struct AdminClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, insecure_tls: bool) -> Self {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client configuration is static and always valid");

        AdminClient {
            base_url: normalize_base_url(base_url.into()),
            token,
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            attempt += 1;
            let request = request
                .try_clone()
                .expect("request bodies used by this client are always clonable (JSON or empty)");
            let request = match &self.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            };

            let outcome = request.send().await;
            let result = match outcome {
                Ok(response) => classify(response).await,
                Err(e) if e.is_timeout() => Err(ClientError::Timeout),
                Err(e) => Err(ClientError::Transport(e.to_string())),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "admin request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        parse_json(response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let response = self.send(self.http.post(self.url(path)).json(body)).await?;
        parse_json(response).await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let response = self.send(self.http.put(self.url(path)).json(body)).await?;
        parse_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send(self.http.delete(self.url(path))).await?;
        Ok(())
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let value = self.get(path).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Open a log endpoint and yield each `data: …` line as it arrives.
    /// Log endpoints are never retried on a mid-stream failure — a
    /// dropped connection surfaces to the caller rather than silently
    /// reconnecting and skipping lines.
    pub async fn stream_lines(&self, path: &str) -> Result<impl Stream<Item = Result<String, ClientError>>, ClientError> {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;
        let response = classify(response).await?;
        let bytes = response.bytes_stream();
        Ok(sse_lines(bytes))
    }
}

/// Parse an `EventStream`-framed byte stream (`data: line\n\n`) into
/// individual lines, buffering across chunk boundaries since a single SSE
/// event can arrive split across TCP segments.
fn sse_lines(
    bytes: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>>,
) -> impl Stream<Item = Result<String, ClientError>> {
    futures::stream::unfold((Box::pin(bytes), String::new()), |(mut bytes, mut buf)| async move {
        loop {
            if let Some(pos) = buf.find("\n\n") {
                let event = buf[..pos].to_string();
                buf.drain(..pos + 2);
                let line = event
                    .lines()
                    .find_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")))
                    .unwrap_or("")
                    .to_string();
                return Some((Ok(line), (bytes, buf)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buf.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => return Some((Err(ClientError::Transport(e.to_string())), (bytes, buf))),
                None => return None,
            }
        }
    })
}

fn normalize_base_url(raw: String) -> String {
    // grpcs:// is accepted as an alias for https:// at the CLI boundary;
    // Gordon's admin plane is HTTP/1.1 only.
    let raw = raw.trim_end_matches('/').to_string();
    if let Some(rest) = raw.strip_prefix("grpcs://") {
        format!("https://{rest}")
    } else if let Some(rest) = raw.strip_prefix("grpc://") {
        format!("http://{rest}")
    } else {
        raw
    }
}

async fn classify(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(ClientError::ServerError {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(ClientError::ClientRejected {
            status: status.as_u16(),
            body,
        })
    }
}

async fn parse_json(response: reqwest::Response) -> Result<Value, ClientError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_grpc_aliases() {
        assert_eq!(normalize_base_url("grpcs://gordon.example.com".into()), "https://gordon.example.com");
        assert_eq!(normalize_base_url("grpc://localhost:9090".into()), "http://localhost:9090");
        assert_eq!(normalize_base_url("https://gordon.example.com/".into()), "https://gordon.example.com");
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let m1 = server
            .mock("GET", "/status")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let m2 = server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(r#"{"routes":1}"#)
            .expect(1)
            .create_async()
            .await;

        let client = AdminClient::new(server.url(), None, false);
        let result = client.get("/status").await.unwrap();
        assert_eq!(result["routes"], 1);
        m1.assert_async().await;
        m2.assert_async().await;
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/status")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let client = AdminClient::new(server.url(), None, false);
        let result = client.get("/status").await;
        assert!(matches!(result, Err(ClientError::ClientRejected { status: 400, .. })));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_server_error() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/status")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = AdminClient::new(server.url(), None, false);
        let result = client.get("/status").await;
        assert!(matches!(result, Err(ClientError::ServerError { status: 500, .. })));
        m.assert_async().await;
    }
}
