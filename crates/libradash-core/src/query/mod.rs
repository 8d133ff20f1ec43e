// ── Query layer ──
//
// Fetcher contract, query options, and the coalescing executor.

mod executor;
mod retry;

pub use executor::QueryExecutor;
pub use retry::{Backoff, RetryPolicy};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::CoreError;
use crate::key::QueryKey;

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Live,
    Fallback,
}

/// A fetched value plus its provenance. The executor uses the source
/// to stamp `via_fallback` on the committed cache entry.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: Value,
    pub source: FetchSource,
}

impl Fetched {
    pub fn live(value: Value) -> Self {
        Self {
            value,
            source: FetchSource::Live,
        }
    }

    pub fn fallback(value: Value) -> Self {
        Self {
            value,
            source: FetchSource::Fallback,
        }
    }
}

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Fetched, CoreError>> + Send>>;

/// The fetcher contract: one async request for one key.
///
/// Implementations must not cache or retry themselves -- the executor
/// owns both concerns.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, key: &QueryKey) -> FetchFuture;
}

struct FnFetcher<F> {
    f: F,
}

impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(QueryKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fetched, CoreError>> + Send + 'static,
{
    fn fetch(&self, key: &QueryKey) -> FetchFuture {
        Box::pin((self.f)(key.clone()))
    }
}

/// Adapt an async closure into a [`Fetcher`].
pub fn fetch_fn<F, Fut>(f: F) -> Arc<dyn Fetcher>
where
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fetched, CoreError>> + Send + 'static,
{
    Arc::new(FnFetcher { f })
}

/// A query request: either active under a key, or disabled.
///
/// Modeled as a variant rather than a boolean flag so a disabled query
/// cannot be miswired into a silent no-op at a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySpec {
    Active(QueryKey),
    Disabled,
}

impl QuerySpec {
    pub fn enabled_if(key: QueryKey, enabled: bool) -> Self {
        if enabled {
            Self::Active(key)
        } else {
            Self::Disabled
        }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        match self {
            Self::Active(key) => Some(key),
            Self::Disabled => None,
        }
    }
}

/// Per-query tuning consulted by the executor.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// How long a successful result stays fresh.
    pub stale_time: Duration,
    /// How long an unsubscribed entry survives before garbage collection.
    pub cache_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            cache_time: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}
