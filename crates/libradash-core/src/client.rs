// ── Cache client ──
//
// The entry point consumers inject (constructor or context) -- never a
// module-level global, so tests stay isolated. Bundles the store, the
// coalescing executor, the mutation coordinator, and the one shared
// fallback policy, and owns the background garbage-collection task.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::fallback::{FallbackPolicy, FallbackResolver, MockFactory};
use crate::key::QueryKey;
use crate::mutation::{Mutation, MutationCoordinator, MutationOptions};
use crate::query::{Fetcher, QueryExecutor, QueryOptions, QuerySpec, RetryPolicy};
use crate::store::{CacheEntry, CacheStore, QueryStatus, Subscription};
use crate::stream::EntryStream;

/// Client-wide defaults, usually built from `libradash-config`.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_time: Duration,
    pub cache_time: Duration,
    pub retry: RetryPolicy,
    pub gc_interval: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            cache_time: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            gc_interval: Duration::from_secs(60),
            fallback: FallbackPolicy::off(),
        }
    }
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Pages subscribe to query
/// keys through it, mutations route their cache effects through it,
/// and it garbage-collects unreferenced entries in the background.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    store: Arc<CacheStore>,
    executor: QueryExecutor,
    mutations: MutationCoordinator,
    fallback: FallbackResolver,
    settings: CacheSettings,
    cancel: CancellationToken,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl CacheClient {
    pub fn new(settings: CacheSettings) -> Self {
        let store = Arc::new(CacheStore::new());
        Self {
            inner: Arc::new(ClientInner {
                executor: QueryExecutor::new(Arc::clone(&store)),
                mutations: MutationCoordinator::new(Arc::clone(&store)),
                fallback: FallbackResolver::new(settings.fallback),
                store,
                settings,
                cancel: CancellationToken::new(),
                gc_task: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Query options seeded from the client-wide defaults.
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: self.inner.settings.stale_time,
            cache_time: self.inner.settings.cache_time,
            retry: self.inner.settings.retry.clone(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Resolve a query, fetching if missing or stale. Awaitable form of
    /// [`subscribe`](Self::subscribe) for imperative call sites.
    pub async fn fetch(
        &self,
        spec: &QuerySpec,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
    ) -> Arc<CacheEntry> {
        self.inner.executor.execute(spec, fetcher, options).await
    }

    /// Subscribe to a query key. Registers a cache subscription for the
    /// handle's lifetime and kicks off a background fetch when the
    /// entry is missing or stale; the handle observes every entry
    /// replacement through its watch channel.
    pub fn subscribe(
        &self,
        spec: QuerySpec,
        fetcher: Arc<dyn Fetcher>,
        options: QueryOptions,
    ) -> QueryHandle {
        match &spec {
            QuerySpec::Active(key) => {
                let subscription = Some(self.inner.store.subscribe(key));
                let receiver = self.inner.store.watch(key);

                let client = self.clone();
                let task_spec = spec.clone();
                let task_fetcher = Arc::clone(&fetcher);
                let task_options = options.clone();
                tokio::spawn(async move {
                    let _ = client
                        .inner
                        .executor
                        .execute(&task_spec, &task_fetcher, &task_options)
                        .await;
                });

                QueryHandle {
                    client: self.clone(),
                    spec,
                    fetcher,
                    options,
                    subscription,
                    receiver,
                    _detached: None,
                }
            }
            QuerySpec::Disabled => {
                // No slot, no I/O: a private idle channel keeps the
                // handle API uniform.
                let (tx, rx) = watch::channel(Arc::new(CacheEntry::idle()));
                QueryHandle {
                    client: self.clone(),
                    spec,
                    fetcher,
                    options,
                    subscription: None,
                    receiver: rx,
                    _detached: Some(tx),
                }
            }
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub fn mutation(&self, options: MutationOptions) -> Mutation {
        self.inner.mutations.mutation(options)
    }

    /// One-shot mutation: build a handle, run it, return the result.
    pub async fn mutate<V, F, Fut>(
        &self,
        options: MutationOptions,
        variables: V,
        op: F,
    ) -> Result<Arc<Value>, Arc<CoreError>>
    where
        F: FnOnce(V) -> Fut,
        Fut: Future<Output = Result<Value, CoreError>>,
    {
        self.mutation(options).run(variables, op).await
    }

    // ── Invalidation ─────────────────────────────────────────────────

    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.store.invalidate(key, Instant::now())
    }

    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        self.inner.store.invalidate_prefix(prefix, Instant::now())
    }

    // ── Fallback ─────────────────────────────────────────────────────

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.inner.fallback.policy()
    }

    /// Wrap a fetcher with the client-wide fallback policy.
    pub fn with_fallback(
        &self,
        primary: Arc<dyn Fetcher>,
        mock_factory: MockFactory,
    ) -> Arc<dyn Fetcher> {
        self.inner.fallback.wrap(primary, mock_factory)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the background garbage-collection task. Idempotent.
    pub async fn start_gc(&self) {
        let mut guard = self.inner.gc_task.lock().await;
        if guard.is_some() {
            return;
        }

        let store = Arc::clone(&self.inner.store);
        let cache_time = self.inner.settings.cache_time;
        let gc_interval = self.inner.settings.gc_interval;
        let cancel = self.inner.cancel.clone();

        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gc_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep(Instant::now(), cache_time);
                    }
                }
            }
            debug!("gc task stopped");
        }));
    }

    /// Stop background work. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.gc_task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl Default for CacheClient {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

// ── Query handle ─────────────────────────────────────────────────────

/// What a page holds while mounted: live entry snapshots, change
/// notification, and manual refetch. Dropping the handle releases the
/// cache subscription.
pub struct QueryHandle {
    client: CacheClient,
    spec: QuerySpec,
    fetcher: Arc<dyn Fetcher>,
    options: QueryOptions,
    subscription: Option<Subscription>,
    receiver: watch::Receiver<Arc<CacheEntry>>,
    _detached: Option<watch::Sender<Arc<CacheEntry>>>,
}

impl QueryHandle {
    pub fn key(&self) -> Option<&QueryKey> {
        self.spec.key()
    }

    /// Latest entry snapshot.
    pub fn snapshot(&self) -> Arc<CacheEntry> {
        self.receiver.borrow().clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.snapshot().status
    }

    pub fn data(&self) -> Option<Arc<Value>> {
        self.snapshot().data.clone()
    }

    pub fn error(&self) -> Option<Arc<CoreError>> {
        self.snapshot().error.clone()
    }

    /// Deserialize the current data into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, CoreError> {
        self.snapshot()
            .data
            .as_deref()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| CoreError::Deserialization {
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Wait for the next entry replacement, returning the new snapshot.
    /// Returns `None` if the underlying slot was deleted.
    pub async fn changed(&mut self) -> Option<Arc<CacheEntry>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Force a refetch, coalescing with any fetch already in flight.
    /// A disabled query returns its idle snapshot and performs no I/O.
    pub async fn refetch(&self) -> Arc<CacheEntry> {
        match self.spec {
            QuerySpec::Active(_) => {
                self.client
                    .inner
                    .executor
                    .execute_force(&self.spec, &self.fetcher, &self.options)
                    .await
            }
            QuerySpec::Disabled => self.snapshot(),
        }
    }

    /// Convert into a `Stream` of entry snapshots. The cache
    /// subscription moves into the stream.
    pub fn into_stream(self) -> EntryStream {
        EntryStream::new(self.receiver, self.subscription)
    }
}
