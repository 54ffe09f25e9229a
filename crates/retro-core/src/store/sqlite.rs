//! SQLite-backed document store.
//!
//! Documents are stored as JSON text in a single table keyed by
//! `(collection, id)`. Queries load the collection and filter in process,
//! which is plenty for a meeting-notes workload.
//!
//! Listeners only observe writes made through this handle; another process
//! writing the same file is not seen until the next query.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::{
    apply_array_remove, apply_array_union, apply_update, generate_id, DocumentStore, Document, Fields,
    ListenerRegistration, ListenerRegistry, Query, SnapshotListener,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS document (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
";

/// Document store over a SQLite file.
///
/// Thread-safe via internal Mutex. All operations acquire the lock.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    listeners: ListenerRegistry,
}

impl SqliteDocumentStore {
    /// Open database at specific path, creating the schema if needed
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            listeners: ListenerRegistry::new(),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    fn load(conn: &Connection, collection: &str, id: &str) -> Result<Option<Value>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM document WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    fn store(conn: &Connection, collection: &str, id: &str, body: &Value) -> Result<()> {
        conn.execute(
            "INSERT INTO document (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![
                collection,
                id,
                serde_json::to_string(body)?,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn run_query(conn: &Connection, query: &Query) -> Result<Vec<Document>> {
        let mut stmt = conn.prepare("SELECT id, body FROM document WHERE collection = ?1")?;
        let rows = stmt
            .query_map(params![query.collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let docs = rows
            .into_iter()
            .map(|(id, body)| -> Result<Document> { Ok(Document::new(id, serde_json::from_str(&body)?)) })
            .collect::<Result<Vec<_>>>()?;

        Ok(query.apply(docs))
    }

    /// Read-modify-write one document inside a transaction and notify listeners.
    fn modify(
        &self,
        collection: &str,
        id: &str,
        op: impl FnOnce(&mut Value) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut body = Self::load(&tx, collection, id)?.ok_or_else(|| Error::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        op(&mut body)?;
        Self::store(&tx, collection, id, &body)?;
        tx.commit()?;

        debug!(collection, id, "Document modified");
        self.listeners
            .notify(collection, |query| Self::run_query(&conn, query));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn new_id(&self, _collection: &str) -> String {
        generate_id()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        Ok(Self::load(&conn, collection, id)?.map(|body| Document::new(id, body)))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        Self::run_query(&conn, query)
    }

    async fn set(&self, collection: &str, id: &str, body: Value) -> Result<()> {
        if !body.is_object() {
            return Err(Error::store("document body must be an object"));
        }

        let conn = self.lock()?;
        Self::store(&conn, collection, id, &body)?;
        self.listeners
            .notify(collection, |query| Self::run_query(&conn, query));
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.modify(collection, id, |body| apply_update(body, fields))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM document WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        if deleted > 0 {
            self.listeners
                .notify(collection, |query| Self::run_query(&conn, query));
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
        let conn = self.lock();
        let initial = match &conn {
            Ok(conn) => Self::run_query(conn, &query),
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
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retro.db");

        {
            let store = SqliteDocumentStore::open_path(&path).unwrap();
            store.ping().unwrap();
            store.set("notes", "n1", json!({"title": "kept", "images": []})).await.unwrap();
            store
                .array_union("notes", "n1", "images", vec![json!("file:///a.png")])
                .await
                .unwrap();
        }

        let store = SqliteDocumentStore::open_path(&path).unwrap();
        let doc = store.get("notes", "n1").await.unwrap().unwrap();
        assert_eq!(doc.data["title"], "kept");
        assert_eq!(doc.data["images"], json!(["file:///a.png"]));
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let err = store.update("retro", "nope", Fields::new()).await.unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_and_listener() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.set("notes", "b", json!({"timestamp": 2, "type": "retro"})).await.unwrap();
        store.set("notes", "a", json!({"timestamp": 1, "type": "retro"})).await.unwrap();
        store.set("notes", "c", json!({"timestamp": 0, "type": "cluster"})).await.unwrap();

        let query = Query::collection("notes").where_eq("type", "retro").order_by("timestamp");
        let ids: Vec<_> = store.query(&query).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let registration = store.listen(
            query,
            Box::new(move |event| sink.lock().unwrap().push(event.unwrap().len())),
        );

        store.delete("notes", "a").await.unwrap();
        registration.remove();
        store.delete("notes", "b").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![2, 1]);
    }
}
