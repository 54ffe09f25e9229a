//! Document store boundary.
//!
//! A collection-oriented JSON document store with atomic array mutations and
//! live query subscriptions. Everything above this module talks to the store
//! only through [`DocumentStore`].
//!
//! Backends:
//! - [`MemoryDocumentStore`]: in-process, used by tests and embedders
//! - [`SqliteDocumentStore`]: single-file SQLite database (feature `db`)
//!
//! Listener semantics shared by both backends:
//! - a listener receives the current snapshot as soon as it is registered
//! - every committed write to the listened collection re-evaluates the query
//!   and delivers a fresh snapshot, in commit order
//! - each delivery is either a snapshot or an error, never both

mod memory;
#[cfg(feature = "db")]
mod sqlite;
mod watch;

pub use memory::MemoryDocumentStore;
#[cfg(feature = "db")]
pub use sqlite::SqliteDocumentStore;
pub use watch::{ListenerRegistration, ListenerRegistry};

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level field map used for partial updates.
pub type Fields = Map<String, Value>;

/// One delivery to a snapshot listener.
pub type SnapshotEvent = Result<Vec<Document>>;

/// Callback invoked on every snapshot delivery.
pub type SnapshotListener = Box<dyn Fn(SnapshotEvent) + Send + Sync>;

/// A stored document and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), data }
    }

    /// Deserialize the document body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Read a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

/// Single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field >= value`
    Gte { field: String, value: Value },
}

impl Filter {
    /// Documents missing the field never match.
    fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq { field, value } => data.get(field).is_some_and(|v| v == value),
            Filter::Gte { field, value } => data
                .get(field)
                .is_some_and(|v| compare_values(v, value) != Ordering::Less),
        }
    }
}

/// Query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        let has_order_field = self
            .order_by
            .as_ref()
            .is_none_or(|field| data.get(field).is_some());
        has_order_field && self.filters.iter().all(|f| f.matches(data))
    }

    /// Filter and order a full collection listing.
    ///
    /// Ties on the order field fall back to document id.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut result: Vec<Document> = docs.into_iter().filter(|d| self.matches(&d.data)).collect();

        match &self.order_by {
            Some(field) => result.sort_by(|a, b| {
                let left = a.data.get(field).unwrap_or(&Value::Null);
                let right = b.data.get(field).unwrap_or(&Value::Null);
                compare_values(left, right).then_with(|| a.id.cmp(&b.id))
            }),
            None => result.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        result
    }
}

/// Total order over JSON values.
///
/// Types order as null < bool < number < string < array < object; values of
/// the same type compare naturally, strings by UTF-8 bytes.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutations shared by the backends
// ─────────────────────────────────────────────────────────────────────────────

/// Merge top-level fields into a document body.
pub(crate) fn apply_update(doc: &mut Value, fields: Fields) -> Result<()> {
    let object = doc
        .as_object_mut()
        .ok_or_else(|| Error::store("document body is not an object"))?;
    for (key, value) in fields {
        object.insert(key, value);
    }
    Ok(())
}

/// Append each value not already present. A missing or non-array field becomes
/// an array of the given values.
pub(crate) fn apply_array_union(doc: &mut Value, field: &str, values: Vec<Value>) -> Result<()> {
    let object = doc
        .as_object_mut()
        .ok_or_else(|| Error::store("document body is not an object"))?;

    let entry = object.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        for value in values {
            if !items.contains(&value) {
                items.push(value);
            }
        }
    }
    Ok(())
}

/// Remove every element equal to one of the given values.
pub(crate) fn apply_array_remove(doc: &mut Value, field: &str, values: &[Value]) -> Result<()> {
    let object = doc
        .as_object_mut()
        .ok_or_else(|| Error::store("document body is not an object"))?;

    match object.get_mut(field) {
        Some(Value::Array(items)) => items.retain(|item| !values.contains(item)),
        _ => {
            object.insert(field.to_string(), Value::Array(Vec::new()));
        }
    }
    Ok(())
}

/// Generate a document id.
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Store trait
// ─────────────────────────────────────────────────────────────────────────────

/// Collection-oriented document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Allocate a fresh document id without writing anything.
    fn new_id(&self, collection: &str) -> String;

    /// Get a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Run a query once.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Create or fully replace a document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with [`Error::DocumentNotFound`] when the document is missing.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Atomically add values to an array field, skipping ones already present.
    async fn array_union(&self, collection: &str, id: &str, field: &str, values: Vec<Value>) -> Result<()>;

    /// Atomically remove values from an array field by full value equality.
    async fn array_remove(&self, collection: &str, id: &str, field: &str, values: Vec<Value>) -> Result<()>;

    /// Subscribe to a query. Dropping the registration unsubscribes.
    fn listen(&self, query: Query, listener: SnapshotListener) -> ListenerRegistration;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        Document::new(id, data)
    }

    #[test]
    fn test_compare_values_type_order() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1.5), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!("Sprint"), &json!("Sprint")), Ordering::Equal);
    }

    #[test]
    fn test_query_filters_and_orders() {
        let docs = vec![
            doc("a", json!({"title": "Zeta", "type": "retro", "timestamp": 3})),
            doc("b", json!({"title": "Alpha", "type": "retro", "timestamp": 1})),
            doc("c", json!({"title": "Mid", "type": "cluster", "timestamp": 2})),
            doc("d", json!({"title": "Mid", "type": "retro", "timestamp": 0})),
            doc("e", json!({"type": "retro", "timestamp": 4})),
        ];

        let query = Query::collection("notes")
            .where_gte("title", "Mid")
            .where_eq("type", "retro")
            .order_by("timestamp");

        let ids: Vec<_> = query.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[test]
    fn test_order_by_excludes_missing_field() {
        let docs = vec![
            doc("a", json!({"timestamp": 2})),
            doc("b", json!({"title": "no timestamp"})),
            doc("c", json!({"timestamp": 1})),
        ];
        let ids: Vec<_> = Query::collection("notes")
            .order_by("timestamp")
            .apply(docs)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_array_union_skips_present_values() {
        let mut body = json!({"notes": [1, 2]});
        apply_array_union(&mut body, "notes", vec![json!(2), json!(3)]).unwrap();
        assert_eq!(body["notes"], json!([1, 2, 3]));

        let mut body = json!({});
        apply_array_union(&mut body, "images", vec![json!("x")]).unwrap();
        assert_eq!(body["images"], json!(["x"]));
    }

    #[test]
    fn test_array_remove_by_value() {
        let mut body = json!({"notes": [{"id": "1", "title": "a"}, {"id": "2"}, {"id": "1", "title": "a"}]});
        apply_array_remove(&mut body, "notes", &[json!({"id": "1", "title": "a"})]).unwrap();
        assert_eq!(body["notes"], json!([{"id": "2"}]));

        // A modified copy does not match
        apply_array_remove(&mut body, "notes", &[json!({"id": "2", "title": "changed"})]).unwrap();
        assert_eq!(body["notes"], json!([{"id": "2"}]));
    }

    #[test]
    fn test_apply_update_merges_fields() {
        let mut body = json!({"title": "old", "time": 1});
        let mut fields = Fields::new();
        fields.insert("time".into(), json!(5));
        apply_update(&mut body, fields).unwrap();
        assert_eq!(body, json!({"title": "old", "time": 5}));

        let mut scalar = json!(3);
        assert!(apply_update(&mut scalar, Fields::new()).is_err());
    }
}
