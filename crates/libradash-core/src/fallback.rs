// ── Fallback resolver ──
//
// Wraps a fetcher so that transport failures can be masked with
// deterministic mock data. One policy value is injected at client
// construction and shared by every wrapped fetcher -- there are no
// per-call-site toggles.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::key::QueryKey;
use crate::query::{FetchFuture, Fetched, Fetcher};

/// Whether transport failures may be substituted with mock data.
///
/// CAUTION: an enabled policy masks genuine backend outages -- the
/// cache commits fallback data as a normal success. Committed entries
/// carry `via_fallback` so diagnostics can still tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FallbackPolicy {
    pub enabled: bool,
}

impl FallbackPolicy {
    pub fn on() -> Self {
        Self { enabled: true }
    }

    pub fn off() -> Self {
        Self { enabled: false }
    }
}

/// A pure, deterministic mock generator: same key, same value, always.
/// Randomness here breaks reproducibility and is a bug.
pub type MockFactory = Arc<dyn Fn(&QueryKey) -> Value + Send + Sync>;

/// Wraps fetchers with the shared fallback policy.
#[derive(Clone)]
pub struct FallbackResolver {
    policy: FallbackPolicy,
}

impl FallbackResolver {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Wrap `primary` so that maskable failures substitute
    /// `mock_factory(key)` when the policy is enabled. A disabled
    /// policy propagates the original error unmodified.
    pub fn wrap(&self, primary: Arc<dyn Fetcher>, mock_factory: MockFactory) -> Arc<dyn Fetcher> {
        Arc::new(FallbackFetcher {
            primary,
            mock_factory,
            policy: self.policy,
        })
    }
}

struct FallbackFetcher {
    primary: Arc<dyn Fetcher>,
    mock_factory: MockFactory,
    policy: FallbackPolicy,
}

impl Fetcher for FallbackFetcher {
    fn fetch(&self, key: &QueryKey) -> FetchFuture {
        let primary = Arc::clone(&self.primary);
        let mock_factory = Arc::clone(&self.mock_factory);
        let policy = self.policy;
        let key = key.clone();
        Box::pin(async move {
            match primary.fetch(&key).await {
                Ok(fetched) => Ok(fetched),
                Err(err) if policy.enabled && err.is_maskable() => {
                    warn!(%key, error = %err, "live fetch failed; substituting deterministic mock data");
                    Ok(Fetched::fallback((mock_factory)(&key)))
                }
                Err(err) => Err(err),
            }
        })
    }
}
