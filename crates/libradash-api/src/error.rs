use thiserror::Error;

/// Top-level error type for the `libradash-api` crate.
///
/// Covers every transport-level failure mode. `libradash-core` maps
/// these into its own domain error type — consumers of the data layer
/// never see `reqwest` types directly.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport configuration could not be applied (bad header, etc.)
    #[error("Invalid transport configuration: {0}")]
    Config(String),

    // ── Backend ─────────────────────────────────────────────────────
    /// Non-2xx response from the backend.
    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl ApiError {
    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Connection failures, timeouts, and 5xx responses qualify; 4xx
    /// responses and parse failures never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The HTTP status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
