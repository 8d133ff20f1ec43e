// ── Reactive entry streams ──
//
// Stream adapter over a cache slot's watch channel, for consumers that
// prefer `StreamExt` combinators over polling `changed()`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::{CacheEntry, Subscription};

/// `Stream` of entry snapshots for one query key.
///
/// Yields a new `Arc<CacheEntry>` each time the entry is replaced.
/// Holds the originating [`Subscription`] so the subscriber count stays
/// accurate for as long as the stream is alive.
pub struct EntryStream {
    inner: WatchStream<Arc<CacheEntry>>,
    _subscription: Option<Subscription>,
}

impl EntryStream {
    pub(crate) fn new(
        receiver: watch::Receiver<Arc<CacheEntry>>,
        subscription: Option<Subscription>,
    ) -> Self {
        Self {
            inner: WatchStream::new(receiver),
            _subscription: subscription,
        }
    }
}

impl Stream for EntryStream {
    type Item = Arc<CacheEntry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
