//! Standalone note service.
//!
//! CRUD over the notes collection plus the live, filtered note list.
//! Images are uploaded to the blob store before the note document is written;
//! the note only ever stores download URLs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       NoteService                         │
//! │  ┌────────────┐  ┌──────────────┐  ┌───────────────────┐  │
//! │  │  add/update │  │ filtered list │  │   delete_image    │  │
//! │  │ (uploads)   │  │ (LiveQuery)   │  │ (blob, then doc)  │  │
//! │  └────────────┘  └──────────────┘  └───────────────────┘  │
//! │        │                 │                   │            │
//! │   BlobStore        DocumentStore        both stores       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use retro_core::note::{NoteService, NoteServiceConfig};
//!
//! let notes = NoteService::new(store, blobs, clock, NoteServiceConfig::default());
//! let note = notes.add_note(new_note).await?;
//!
//! let mut board = notes.filtered_notes(&NoteFilter::default()).stream();
//! while let Some(update) = board.next().await { /* render */ }
//! ```

mod service;

pub use service::*;

/// Configuration for the note service.
#[derive(Debug, Clone)]
pub struct NoteServiceConfig {
    /// Collection holding standalone notes.
    pub collection: String,
    /// Blob path prefix for uploaded images.
    pub image_prefix: String,
}

impl Default for NoteServiceConfig {
    fn default() -> Self {
        Self {
            collection: "notes".to_string(),
            image_prefix: "images".to_string(),
        }
    }
}

impl NoteServiceConfig {
    pub fn with_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }
}

/// Make an uploaded file name safe to use as one blob path segment.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NoteServiceConfig::default();
        assert_eq!(config.collection, "notes");
        assert_eq!(config.image_prefix, "images");
        assert_eq!(NoteServiceConfig::with_collection("archive").collection, "archive");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("board.png"), "board.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name(".."), "image");
        assert_eq!(sanitize_file_name(""), "image");
    }
}
