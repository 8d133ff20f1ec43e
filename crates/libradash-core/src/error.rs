// ── Core error types ──
//
// User-facing errors from libradash-core. These are NOT transport
// specific -- consumers never see reqwest or JSON parse failures
// directly. The `From<ApiError>` impl translates transport-layer
// errors into domain-appropriate variants.

use thiserror::Error;

use libradash_api::ApiError;

/// Unified error type for the core crate.
///
/// Clonable on purpose: cached entries hand out `Arc<CoreError>`
/// snapshots, and wizard/mutation callers sometimes need an owned copy.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Transport errors (translated) ────────────────────────────────
    #[error("network error: {message}")]
    Network { message: String },

    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("malformed response: {message}")]
    Deserialization { message: String },

    // ── Local errors ─────────────────────────────────────────────────
    /// A wizard step (or other local input) failed validation.
    /// Never retried, never sent over the wire.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Programmer error in cache bookkeeping (e.g. a subscriber count
    /// underflow). Not recoverable by retrying.
    #[error("cache consistency violation: {0}")]
    CacheConsistency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is transient and eligible for retry.
    ///
    /// Network failures, timeouts, and 5xx responses qualify. 4xx
    /// responses, validation failures, and consistency violations never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the fallback resolver is allowed to mask this
    /// error with deterministic mock data.
    ///
    /// Only transport-kind failures qualify -- local errors are never
    /// masked.
    pub fn is_maskable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Http { .. } | Self::Timeout { .. }
        )
    }

    /// The HTTP status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            // The transport layer classifies timeouts itself, where the
            // configured timeout is known.
            ApiError::Network(e) => CoreError::Network {
                message: e.to_string(),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Http { status, message } => CoreError::Http { status, message },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Deserialization { message }
            }
            ApiError::InvalidUrl(e) => CoreError::Internal(format!("invalid URL: {e}")),
            ApiError::Config(message) => CoreError::Internal(message),
        }
    }
}
