// ── REST client ──
//
// Thin JSON-over-HTTP client for the dashboard backend. Exposes the
// four verbs the data layer needs and normalizes every failure into
// `ApiError`. No caching, no retries — that is the core crate's job.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::transport::TransportConfig;

/// JSON REST client for the dashboard backend.
///
/// Cheap to clone (`reqwest::Client` is internally reference-counted).
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    timeout_secs: u64,
}

impl RestClient {
    /// Build a client from a transport config.
    pub fn new(config: &TransportConfig) -> Result<Self, ApiError> {
        Ok(Self {
            http: config.build_client()?,
            base: config.base_url.clone(),
            timeout_secs: config.timeout.as_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client` (test seam).
    pub fn with_client(http: reqwest::Client, base: Url) -> Self {
        Self {
            http,
            base,
            timeout_secs: 30,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        self.execute(self.http.get(url)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        self.execute(self.http.post(url).json(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "PUT");
        self.execute(self.http.put(url).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "DELETE");
        self.execute(self.http.delete(url)).await
    }

    // ── Private helpers ─────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// Timeouts are classified here, where the configured timeout is
    /// known; everything else stays a plain network error.
    fn network_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            ApiError::Network(e)
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await.map_err(|e| self.network_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.network_error(e))?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: extract_message(&body, status),
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend sends `{"message": "..."}` on errors; fall back to the
/// status line when the body is empty or not JSON.
fn extract_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned()
        })
}
