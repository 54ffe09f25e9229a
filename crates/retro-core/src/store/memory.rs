//! In-process document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{
    apply_array_remove, apply_array_union, apply_update, generate_id, DocumentStore, Document, Fields,
    ListenerRegistration, ListenerRegistry, Query, SnapshotListener,
};

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Document store kept entirely in memory.
///
/// Thread-safe via internal Mutex. Writes notify listeners while the lock is
/// held, so deliveries follow commit order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    data: Mutex<Collections>,
    listeners: ListenerRegistry,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live snapshot listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.data.lock().map_err(|_| Error::LockPoisoned)
    }

    fn run_query(data: &Collections, query: &Query) -> Vec<Document> {
        let docs = data
            .get(&query.collection)
            .into_iter()
            .flat_map(|c| c.iter())
            .map(|(id, body)| Document::new(id.clone(), body.clone()));
        query.apply(docs)
    }

    /// Mutate an existing document and notify listeners.
    fn modify(
        &self,
        collection: &str,
        id: &str,
        op: impl FnOnce(&mut Value) -> Result<()>,
    ) -> Result<()> {
        let mut data = self.lock()?;
        let body = data
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| Error::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        // Work on a copy so a failed op leaves the document untouched
        let mut updated = body.clone();
        op(&mut updated)?;
        *body = updated;

        self.listeners
            .notify(collection, |query| Ok(Self::run_query(&data, query)));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn new_id(&self, _collection: &str) -> String {
        generate_id()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let data = self.lock()?;
        Ok(data
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|body| Document::new(id, body.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let data = self.lock()?;
        Ok(Self::run_query(&data, query))
    }

    async fn set(&self, collection: &str, id: &str, body: Value) -> Result<()> {
        if !body.is_object() {
            return Err(Error::store("document body must be an object"));
        }

        let mut data = self.lock()?;
        data.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);

        self.listeners
            .notify(collection, |query| Ok(Self::run_query(&data, query)));
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.modify(collection, id, |body| apply_update(body, fields))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut data = self.lock()?;
        let removed = data
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();

        if removed {
            self.listeners
                .notify(collection, |query| Ok(Self::run_query(&data, query)));
        }
        Ok(())
    }

    async fn array_union(&self, collection: &str, id: &str, field: &str, values: Vec<Value>) -> Result<()> {
        self.modify(collection, id, |body| apply_array_union(body, field, values))
    }

    async fn array_remove(&self, collection: &str, id: &str, field: &str, values: Vec<Value>) -> Result<()> {
        self.modify(collection, id, |body| apply_array_remove(body, field, &values))
    }

    fn listen(&self, query: Query, listener: SnapshotListener) -> ListenerRegistration {
        let data = self.data.lock();
        let initial = match &data {
            Ok(data) => Ok(Self::run_query(data, &query)),
            Err(_) => Err(Error::LockPoisoned),
        };
        self.listeners.register(query, listener, initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn recording_listener() -> (SnapshotListener, Arc<Mutex<Vec<Vec<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: SnapshotListener = Box::new(move |event| {
            let ids = event.unwrap().into_iter().map(|d| d.id).collect();
            sink.lock().unwrap().push(ids);
        });
        (listener, seen)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryDocumentStore::new();
        store.set("notes", "n1", json!({"title": "a"})).await.unwrap();

        let doc = store.get("notes", "n1").await.unwrap().unwrap();
        assert_eq!(doc.data["title"], "a");

        store.delete("notes", "n1").await.unwrap();
        assert!(store.get("notes", "n1").await.unwrap().is_none());

        // Deleting again is fine
        assert_ok!(store.delete("notes", "n1").await);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = MemoryDocumentStore::new();
        let err = store.update("notes", "missing", Fields::new()).await.unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_set_rejects_non_object() {
        let store = MemoryDocumentStore::new();
        assert!(store.set("notes", "n1", json!([1, 2])).await.is_err());
    }

    #[tokio::test]
    async fn test_listener_sees_initial_and_commits() {
        let store = MemoryDocumentStore::new();
        store.set("retro", "r1", json!({"active": false})).await.unwrap();

        let (listener, seen) = recording_listener();
        let registration = store.listen(Query::collection("retro").where_eq("active", true), listener);

        store.set("retro", "r2", json!({"active": true})).await.unwrap();
        store.set("notes", "n1", json!({"active": true})).await.unwrap();
        store
            .update("retro", "r2", serde_json::from_value(json!({"active": false})).unwrap())
            .await
            .unwrap();

        let snapshots = seen.lock().unwrap().clone();
        assert_eq!(snapshots, vec![vec![], vec!["r2".to_string()], vec![]]);

        drop(registration);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_unions_are_not_lost() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.set("retro", "r1", json!({"notes": []})).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .array_union("retro", "r1", "notes", vec![json!({"id": i})])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.get("retro", "r1").await.unwrap().unwrap();
        assert_eq!(doc.data["notes"].as_array().unwrap().len(), 16);
    }
}
