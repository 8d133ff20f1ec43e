// Shared transport configuration for building reqwest::Client instances.
//
// The dashboard talks to a single REST backend; base URL, timeout, and
// the optional bearer token all live here so that every client built
// from the same config behaves identically.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::ApiError;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Backend base URL (e.g., `https://stats.example.org/api/`).
    pub base_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Optional bearer token sent on every request.
    pub api_token: Option<SecretString>,
}

impl TransportConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            api_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_token(mut self, token: SecretString) -> Self {
        self.api_token = Some(token);
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.api_token {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|e| ApiError::Config(format!("invalid API token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("libradash/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(ApiError::Network)
    }
}
