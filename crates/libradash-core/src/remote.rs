// ── REST adapters ──
//
// Bridges between the transport crate and the query layer: turn a
// RestClient route into a Fetcher, and REST verbs into mutation ops.

use std::sync::Arc;

use libradash_api::RestClient;
use serde_json::Value;

use crate::error::CoreError;
use crate::key::QueryKey;
use crate::query::{FetchFuture, Fetched, Fetcher};

/// Maps a query key to a REST path, e.g.
/// `["libraries", {"state": "NY"}]` → `"libraries?state=NY"`.
pub type RouteFn = Arc<dyn Fn(&QueryKey) -> String + Send + Sync>;

/// A [`Fetcher`] that GETs the routed path and yields the JSON body.
pub fn rest_fetcher(client: RestClient, route: RouteFn) -> Arc<dyn Fetcher> {
    Arc::new(RestFetcher { client, route })
}

struct RestFetcher {
    client: RestClient,
    route: RouteFn,
}

impl Fetcher for RestFetcher {
    fn fetch(&self, key: &QueryKey) -> FetchFuture {
        let client = self.client.clone();
        let path = (self.route)(key);
        Box::pin(async move {
            let value = client.get(&path).await.map_err(CoreError::from)?;
            Ok(Fetched::live(value))
        })
    }
}

/// POST a mutation payload, translating transport errors.
pub async fn post_mutation(
    client: &RestClient,
    path: &str,
    body: &Value,
) -> Result<Value, CoreError> {
    client.post(path, body).await.map_err(CoreError::from)
}

/// PUT a mutation payload, translating transport errors.
pub async fn put_mutation(
    client: &RestClient,
    path: &str,
    body: &Value,
) -> Result<Value, CoreError> {
    client.put(path, body).await.map_err(CoreError::from)
}
