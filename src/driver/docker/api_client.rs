// ============================================================================
// File: packages/adles/src/driver/docker/api_client.rs
// ----------------------------------------------------------------------------
// Docker Engine API client over the engine's unix socket.
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_client_sockets::{Backend, tokio::TokioBackend};
use serde_json::Value;
use tokio::time::timeout;

use crate::driver::{DriverError, DriverResult};

/// Engine API version requests are pinned to
const API_VERSION: &str = "v1.43";

/// Call counters for one client
#[derive(Debug, Default)]
pub struct ApiStats {
    api_calls: AtomicU64,
    failed_calls: AtomicU64,
}

impl ApiStats {
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }
}

/// Response of an engine call
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    /// Body parsed as JSON, `Value::Null` when empty
    pub fn json(&self) -> DriverResult<Value> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| DriverError::Api {
            status: self.status.as_u16(),
            message: format!("invalid JSON in response: {e}"),
        })
    }

    /// Engine error message, falling back to the raw body
    fn message(&self) -> String {
        serde_json::from_slice::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).into_owned())
    }
}

/// Docker Engine API client
#[derive(Debug, Clone)]
pub struct DockerApiClient {
    socket_path: PathBuf,
    timeout: Duration,
    stats: Arc<ApiStats>,
}

impl DockerApiClient {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
            stats: Arc::new(ApiStats::default()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn stats(&self) -> &ApiStats {
        &self.stats
    }

    /// Send one request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Engine path including query, without the version prefix
    /// * `body` - Optional JSON body
    ///
    /// # Returns
    /// The response for any status; transport failures and timeouts are errors
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> DriverResult<ApiResponse> {
        self.stats.api_calls.fetch_add(1, Ordering::Relaxed);
        let result = timeout(self.timeout, self.send(method, path, body)).await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.stats.failed_calls.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
            Err(_) => {
                self.stats.failed_calls.fetch_add(1, Ordering::Relaxed);
                return Err(DriverError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };
        if !response.status.is_success() {
            self.stats.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        Ok(response)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> DriverResult<ApiResponse> {
        let payload = match body {
            Some(body) => serde_json::to_vec(body)
                .map_err(|e| DriverError::internal(format!("Failed to serialize request body: {e}")))?,
            None => Vec::new(),
        };

        let io = TokioBackend::connect_to_unix_socket(&self.socket_path)
            .await
            .map_err(|e| DriverError::Transport {
                details: format!(
                    "Failed to connect to {}: {e}",
                    self.socket_path.display()
                ),
            })?;

        let (mut send_request, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
            .await
            .map_err(|e| DriverError::Transport {
                details: format!("HTTP handshake failed: {e}"),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::error!("Docker API connection error: {e}");
            }
        });

        let uri = format!("http://localhost/{API_VERSION}/{}", path.trim_start_matches('/'));
        let mut builder = Request::builder()
            .method(method)
            .uri(&uri)
            .header("Host", "localhost")
            .header("Accept", "application/json");
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| DriverError::internal(format!("Failed to build HTTP request: {e}")))?;

        let response = send_request
            .send_request(request)
            .await
            .map_err(|e| DriverError::Transport {
                details: format!("Failed to send API request: {e}"),
            })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DriverError::Transport {
                details: format!("Failed to read response body: {e}"),
            })?
            .to_bytes();

        log::trace!("docker {uri} -> {status}");
        Ok(ApiResponse { status, body })
    }

    /// Request expecting success; 404 becomes `NotFound` for `target`
    pub async fn expect_success(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        target: &str,
    ) -> DriverResult<ApiResponse> {
        let response = self.request(method, path, body).await?;
        check_status(response, target)
    }
}

/// Map engine status codes onto driver errors
pub fn check_status(response: ApiResponse, target: &str) -> DriverResult<ApiResponse> {
    match response.status {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_MODIFIED => Ok(response),
        StatusCode::NOT_FOUND => Err(DriverError::not_found(target)),
        StatusCode::CONFLICT => Err(DriverError::rejected(target, response.message())),
        status => Err(DriverError::Api {
            status: status.as_u16(),
            message: format!("{target}: {}", response.message()),
        }),
    }
}

/// Percent-encode a query parameter value
pub fn encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status: StatusCode::from_u16(status).expect("valid status"),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(response(201, "{}"), "c").is_ok());
        assert!(check_status(response(304, ""), "c").is_ok());
        assert!(check_status(response(404, ""), "container web")
            .expect_err("missing")
            .is_not_found());

        let err = check_status(response(409, r#"{"message":"name in use"}"#), "container web")
            .expect_err("conflict");
        assert_eq!(err.to_string(), "container web: name in use");

        let err = check_status(response(500, "boom"), "network LAN").expect_err("server error");
        assert_eq!(
            err,
            DriverError::Api {
                status: 500,
                message: "network LAN: boom".into()
            }
        );
    }

    #[test]
    fn query_encoding() {
        assert_eq!(encode_query("kali:latest"), "kali%3Alatest");
        assert_eq!(encode_query(r#"{"label":["a=b"]}"#), "%7B%22label%22%3A%5B%22a%3Db%22%5D%7D");
    }

    #[test]
    fn empty_body_is_null() {
        assert_eq!(response(204, "").json().expect("empty"), Value::Null);
    }

    #[tokio::test]
    async fn missing_socket_is_transport_error() {
        let client = DockerApiClient::new(
            PathBuf::from("/nonexistent/docker.sock"),
            Duration::from_secs(1),
        );
        let err = client
            .request(Method::GET, "/_ping", None)
            .await
            .expect_err("no socket");
        assert!(matches!(err, DriverError::Transport { .. }));
        assert_eq!(client.stats().failed_calls(), 1);
    }
}
