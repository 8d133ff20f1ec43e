//! Reactive data layer between `libradash-api` and dashboard consumers.
//!
//! This crate owns the caching, fetching, and setup-flow logic for the
//! library statistics dashboard workspace:
//!
//! - **[`CacheClient`]** — Central facade bundling the store, the
//!   coalescing executor, the mutation coordinator, and the shared
//!   fallback policy. Explicitly constructed and injected, never a
//!   module-level global, so tests stay isolated.
//!
//! - **[`CacheStore`]** — Thread-safe storage keyed by the canonical
//!   form of [`QueryKey`] (`DashMap` + `tokio::sync::watch` channels).
//!   Entries are replaced wholesale; every replacement is broadcast to
//!   subscribers.
//!
//! - **[`QueryExecutor`]** — Single-flight request coalescing,
//!   staleness checks, and transient-error retries. At most one fetch
//!   in flight per key; concurrent callers await the same outcome.
//!
//! - **[`Mutation`]** — Write operations with success-only cache
//!   effects: write-through updates and invalidations run before the
//!   caller observes the result, and a failed mutation leaves the
//!   cache untouched.
//!
//! - **[`FallbackResolver`]** — The one place that decides whether a
//!   failed fetch is masked with deterministic demo data. Entries
//!   produced this way carry a `via_fallback` marker.
//!
//! - **[`SetupWizard`]** — The linear first-run flow that accumulates
//!   a [`Configuration`] and submits it atomically through the
//!   mutation coordinator.

pub mod client;
pub mod error;
pub mod fallback;
pub mod key;
pub mod mutation;
pub mod query;
pub mod remote;
pub mod store;
pub mod stream;
pub mod wizard;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{CacheClient, CacheSettings, QueryHandle};
pub use error::CoreError;
pub use fallback::{FallbackPolicy, FallbackResolver, MockFactory};
pub use key::QueryKey;
pub use mutation::{
    Mutation, MutationCoordinator, MutationOptions, MutationSnapshot, MutationStatus, WriteThrough,
    WriteThroughFn,
};
pub use query::{
    Backoff, FetchFuture, FetchSource, Fetched, Fetcher, QueryExecutor, QueryOptions, QuerySpec,
    RetryPolicy, fetch_fn,
};
pub use store::{CacheEntry, CacheStore, QueryStatus, Subscription};
pub use stream::EntryStream;
pub use wizard::{
    CategoryFlags, Configuration, ConfigurationPatch, MetricSelections, SetupWizard, WizardState,
    WizardStep,
};
