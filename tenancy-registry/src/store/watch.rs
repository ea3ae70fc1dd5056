use crate::core::WatchEvent;
use futures::{stream::BoxStream, Stream, StreamExt};
use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};
use tokio_util::sync::CancellationToken;

/// A live stream of [`WatchEvent`]s from a store
///
/// The stream ends when it is stopped, when the watch timeout elapses, or when the
/// request context is cancelled. Dropping it releases the store subscription.
pub struct WatchStream<K> {
    events: BoxStream<'static, WatchEvent<K>>,
    stop: CancellationToken,
}

impl<K> WatchStream<K> {
    pub(crate) fn new(events: BoxStream<'static, WatchEvent<K>>, stop: CancellationToken) -> Self {
        Self { events, stop }
    }

    /// Stop the watch and release its subscription
    pub fn stop(self) {
        self.stop.cancel();
    }

    /// Whether the watch has been asked to stop
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl<K> Stream for WatchStream<K> {
    type Item = WatchEvent<K>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl<K> fmt::Debug for WatchStream<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("stopped", &self.stop.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<K> Drop for WatchStream<K> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
