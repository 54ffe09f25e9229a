//! Error types for retro-core.

use thiserror::Error;

/// Result type alias using retro-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for note and retro session operations
#[derive(Error, Debug)]
pub enum Error {
    // Document store errors
    #[error("Store error: {0}")]
    Store(String),

    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("No document to update: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    // Blob store errors
    #[error("Blob store error: {0}")]
    Blob(String),

    // Lookup errors for writes that need an existing target
    #[error("Retro session not found: {0}")]
    SessionNotFound(String),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("Image not found on note {note_id}: {url}")]
    ImageNotFound { note_id: String, url: String },

    // Local validation, raised before any store call
    #[error("Validation failed: {0}")]
    Validation(String),

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a blob store error
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Blob(message.into())
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DocumentNotFound { .. }
                | Self::SessionNotFound(_)
                | Self::NoteNotFound(_)
                | Self::ImageNotFound { .. }
        )
    }

    /// Check if this error was raised by local validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::validation("note id is blank");
        assert!(err.is_validation());
        assert!(err.to_string().contains("note id is blank"));

        let err = Error::SessionNotFound("retro-1".into());
        assert!(err.is_not_found());
        assert!(err.to_string().contains("retro-1"));

        let err = Error::ImageNotFound {
            note_id: "n1".into(),
            url: "mem://a.png".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }
}
