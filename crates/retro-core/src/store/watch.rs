//! Snapshot listener bookkeeping shared by the store backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use super::{Query, SnapshotEvent, SnapshotListener};

struct Entry {
    query: Query,
    listener: Arc<SnapshotListener>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

/// Registered snapshot listeners of one store.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and deliver its initial snapshot.
    ///
    /// Backends call this while holding their data lock so the initial
    /// snapshot cannot interleave with a concurrent write's delivery.
    pub fn register(
        &self,
        query: Query,
        listener: SnapshotListener,
        initial: SnapshotEvent,
    ) -> ListenerRegistration {
        let listener = Arc::new(listener);
        let id = {
            let mut listeners = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.insert(
                id,
                Entry {
                    query,
                    listener: Arc::clone(&listener),
                },
            );
            id
        };

        debug!(listener_id = id, "Snapshot listener registered");
        (*listener)(initial);

        ListenerRegistration {
            registry: Arc::downgrade(&self.inner),
            id,
            removed: false,
        }
    }

    /// Deliver fresh snapshots to every listener on `collection`.
    ///
    /// `snapshot` evaluates a listener's query against the committed state.
    pub fn notify(&self, collection: &str, snapshot: impl Fn(&Query) -> SnapshotEvent) {
        let targets: Vec<(Query, Arc<SnapshotListener>)> = {
            let listeners = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            listeners
                .entries
                .values()
                .filter(|e| e.query.collection == collection)
                .map(|e| (e.query.clone(), Arc::clone(&e.listener)))
                .collect()
        };

        for (query, listener) in targets {
            (*listener)(snapshot(&query));
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|l| l.entries.len())
            .unwrap_or_else(|p| p.into_inner().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered listener. Unsubscribes exactly once, on
/// [`remove`](Self::remove) or on drop.
pub struct ListenerRegistration {
    registry: Weak<Mutex<Listeners>>,
    id: u64,
    removed: bool,
}

impl ListenerRegistration {
    /// Unsubscribe now.
    pub fn remove(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        if let Some(inner) = self.registry.upgrade() {
            let mut listeners = inner.lock().unwrap_or_else(|p| p.into_inner());
            listeners.entries.remove(&self.id);
            debug!(listener_id = self.id, "Snapshot listener removed");
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .field("removed", &self.removed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: Arc<AtomicUsize>) -> SnapshotListener {
        Box::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_delivers_initial_snapshot() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _registration = registry.register(
            Query::collection("notes"),
            counting_listener(Arc::clone(&calls)),
            Ok(vec![]),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notify_only_matching_collection() {
        let registry = ListenerRegistry::new();
        let notes_calls = Arc::new(AtomicUsize::new(0));
        let retro_calls = Arc::new(AtomicUsize::new(0));

        let _a = registry.register(Query::collection("notes"), counting_listener(Arc::clone(&notes_calls)), Ok(vec![]));
        let _b = registry.register(Query::collection("retro"), counting_listener(Arc::clone(&retro_calls)), Ok(vec![]));

        registry.notify("notes", |_| Ok(vec![]));

        assert_eq!(notes_calls.load(Ordering::SeqCst), 2);
        assert_eq!(retro_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_and_remove_unsubscribe_once() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = registry.register(Query::collection("notes"), counting_listener(Arc::clone(&calls)), Ok(vec![]));
        let second = registry.register(Query::collection("notes"), counting_listener(Arc::clone(&calls)), Ok(vec![]));
        assert_eq!(registry.len(), 2);

        first.remove();
        assert_eq!(registry.len(), 1);

        drop(second);
        assert!(registry.is_empty());

        registry.notify("notes", |_| Ok(vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_outlives_registry() {
        let registry = ListenerRegistry::new();
        let registration = registry.register(Query::collection("notes"), Box::new(|_| {}), Ok(vec![]));
        drop(registry);
        drop(registration);
    }
}
