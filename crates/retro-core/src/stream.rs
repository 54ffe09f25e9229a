//! Live query streams over snapshot listeners.
//!
//! A [`LiveQuery`] is a recipe: each call to [`LiveQuery::stream`] yields a
//! fresh stream that subscribes on first poll and keeps its
//! [`ListenerRegistration`](crate::store::ListenerRegistration) inside the
//! generator, so dropping the stream removes the listener exactly once on
//! every exit path.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::store::{DocumentStore, Query, SnapshotEvent};

type MapFn<T> = Arc<dyn Fn(SnapshotEvent) -> Option<T> + Send + Sync>;

/// Restartable, lazily started, infinite stream of mapped snapshots.
pub struct LiveQuery<T> {
    store: Arc<dyn DocumentStore>,
    query: Query,
    map: MapFn<T>,
    leading: Option<fn() -> T>,
}

impl<T: Send + 'static> LiveQuery<T> {
    /// `map` turns each delivery into an item; `None` skips the delivery.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        query: Query,
        map: impl Fn(SnapshotEvent) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            query,
            map: Arc::new(map),
            leading: None,
        }
    }

    /// Emit `item()` before subscribing, e.g. a loading marker.
    pub fn starting_with(mut self, item: fn() -> T) -> Self {
        self.leading = Some(item);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Start a new subscription stream.
    pub fn stream(&self) -> BoxStream<'static, T> {
        let store = Arc::clone(&self.store);
        let query = self.query.clone();
        let map = Arc::clone(&self.map);
        let leading = self.leading;

        Box::pin(async_stream::stream! {
            if let Some(item) = leading {
                yield item();
            }

            let (tx, mut rx) = mpsc::unbounded_channel::<SnapshotEvent>();
            let _registration = store.listen(query, Box::new(move |event| {
                let _ = tx.send(event);
            }));

            while let Some(event) = rx.recv().await {
                if let Some(item) = map(event) {
                    yield item;
                }
            }
        })
    }
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            query: self.query.clone(),
            map: Arc::clone(&self.map),
            leading: self.leading,
        }
    }
}
