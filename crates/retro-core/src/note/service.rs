//! Note service implementation.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::{generate_id, DocumentStore, Fields, Query, SnapshotEvent};
use crate::stream::LiveQuery;
use crate::types::{ImageSource, NewNote, NoteFilter, Resource, StandaloneNote, UpdateNote};

use super::{sanitize_file_name, NoteServiceConfig};

/// CRUD and live listing for standalone notes.
pub struct NoteService {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: NoteServiceConfig,
}

impl NoteService {
    /// Create a new note service.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: NoteServiceConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            clock,
            config,
        }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Create a note, uploading its images first.
    ///
    /// Uploads run concurrently and are joined before the document is
    /// written. Any failed upload aborts the creation and nothing is
    /// persisted; blobs that did upload are left in place.
    pub async fn add_note(&self, input: NewNote) -> Result<StandaloneNote> {
        if input.user_id.trim().is_empty() {
            return Err(Error::validation("user id cannot be blank"));
        }

        let id = self.store.new_id(&self.config.collection);
        let image_count = input.images.len();
        let images = self.upload_images(&id, input.images).await?;

        let note = StandaloneNote {
            id: id.clone(),
            user_id: input.user_id,
            username: input.username,
            images,
            title: input.title,
            description: input.description,
            timestamp: input.timestamp.unwrap_or_else(|| self.clock.now()),
            note_type: input.note_type,
        };

        self.store
            .set(&self.config.collection, &id, serde_json::to_value(&note)?)
            .await?;

        info!(note_id = %id, images = image_count, note_type = %note.note_type, "Note created");
        Ok(note)
    }

    /// Replace the editable fields of a note and refresh its timestamp.
    ///
    /// Hosted image URLs are kept as they are and other sources uploaded.
    /// An empty image list keeps whatever the note currently has.
    pub async fn update_note(&self, id: &str, input: UpdateNote) -> Result<StandaloneNote> {
        if id.trim().is_empty() {
            return Err(Error::validation("note id cannot be blank"));
        }

        let current = self
            .get_note(id)
            .await?
            .ok_or_else(|| Error::NoteNotFound(id.to_string()))?;

        let images = if input.images.is_empty() {
            current.images
        } else {
            self.upload_images(id, input.images).await?
        };

        let note = StandaloneNote {
            id: id.to_string(),
            user_id: input.user_id,
            username: input.username,
            images,
            title: input.title,
            description: input.description,
            timestamp: self.clock.now(),
            note_type: input.note_type,
        };

        self.store
            .update(&self.config.collection, id, note_fields(&note)?)
            .await
            .map_err(|e| note_not_found(e, id))?;

        info!(note_id = %id, "Note updated");
        Ok(note)
    }

    /// Delete a note. Its images stay in the blob store.
    pub async fn delete_note(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::validation("note id cannot be blank"));
        }
        self.store.delete(&self.config.collection, id).await?;
        info!(note_id = %id, "Note deleted");
        Ok(())
    }

    /// Delete one image: the blob first, then its URL from the note.
    ///
    /// A URL the note does not carry fails before the blob store is
    /// contacted. If removing the URL fails after the blob was deleted the
    /// note keeps a dangling URL.
    pub async fn delete_image(&self, note_id: &str, url: &str) -> Result<()> {
        if note_id.trim().is_empty() {
            return Err(Error::validation("note id cannot be blank"));
        }

        let note = self
            .get_note(note_id)
            .await?
            .ok_or_else(|| Error::NoteNotFound(note_id.to_string()))?;

        if !note.images.iter().any(|image| image == url) {
            return Err(Error::ImageNotFound {
                note_id: note_id.to_string(),
                url: url.to_string(),
            });
        }

        self.blobs.delete_by_url(url).await?;

        if let Err(e) = self
            .store
            .array_remove(&self.config.collection, note_id, "images", vec![Value::String(url.to_string())])
            .await
        {
            warn!(note_id = %note_id, url = %url, error = %e, "Blob deleted but note still lists it");
            return Err(note_not_found(e, note_id));
        }

        info!(note_id = %note_id, url = %url, "Image deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Get a note by id; a missing note is `None`.
    pub async fn get_note(&self, id: &str) -> Result<Option<StandaloneNote>> {
        if id.trim().is_empty() {
            return Err(Error::validation("note id cannot be blank"));
        }
        match self.store.get(&self.config.collection, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// One-shot listing with the same filter semantics as [`Self::filtered_notes`].
    pub async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<StandaloneNote>> {
        let docs = self.store.query(&self.note_query(filter)).await?;
        decode_notes(Ok(docs))
    }

    /// Live note list ordered by timestamp.
    ///
    /// A search string keeps titles `>=` it (a lower bound, not a prefix
    /// match); a type keeps only that meeting type. Each stream starts with
    /// `Loading`.
    pub fn filtered_notes(&self, filter: &NoteFilter) -> LiveQuery<Resource<Vec<StandaloneNote>>> {
        LiveQuery::new(Arc::clone(&self.store), self.note_query(filter), |event| {
            Some(Resource::from(decode_notes(event)))
        })
        .starting_with(|| Resource::Loading)
    }

    /// Live, unfiltered note list.
    pub fn watch_notes(&self) -> LiveQuery<Resource<Vec<StandaloneNote>>> {
        LiveQuery::new(
            Arc::clone(&self.store),
            Query::collection(self.config.collection.as_str()),
            |event| Some(Resource::from(decode_notes(event))),
        )
        .starting_with(|| Resource::Loading)
    }

    fn note_query(&self, filter: &NoteFilter) -> Query {
        let mut query = Query::collection(self.config.collection.as_str()).order_by("timestamp");
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            query = query.where_gte("title", search);
        }
        if let Some(note_type) = filter.note_type {
            query = query.where_eq("type", note_type.as_str());
        }
        query
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Image uploads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Upload concurrently, keeping the input order in the returned URLs.
    async fn upload_images(&self, note_id: &str, sources: Vec<ImageSource>) -> Result<Vec<String>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        try_join_all(sources.into_iter().map(|source| self.upload_image(note_id, source))).await
    }

    async fn upload_image(&self, note_id: &str, source: ImageSource) -> Result<String> {
        let (name, data) = match source {
            ImageSource::Hosted(url) => return Ok(url),
            ImageSource::Bytes { name, data } => (name, data),
            ImageSource::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let data = tokio::fs::read(&path).await?;
                (name, data)
            }
        };

        let path = format!(
            "{}/{}/{}_{}",
            self.config.image_prefix,
            note_id,
            generate_id(),
            sanitize_file_name(&name)
        );
        let blob = self.blobs.upload(&path, data).await?;
        let url = self.blobs.download_url(&blob).await?;
        debug!(note_id = %note_id, url = %url, "Image uploaded");
        Ok(url)
    }
}

fn decode_notes(event: SnapshotEvent) -> Result<Vec<StandaloneNote>> {
    event?.iter().map(|doc| doc.decode::<StandaloneNote>()).collect()
}

fn note_fields(note: &StandaloneNote) -> Result<Fields> {
    match serde_json::to_value(note)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(Error::store("note did not serialize to an object")),
    }
}

fn note_not_found(err: Error, id: &str) -> Error {
    match err {
        Error::DocumentNotFound { .. } => Error::NoteNotFound(id.to_string()),
        other => other,
    }
}
