//! retro-core - Core library for the retro board
//!
//! This crate provides the session repository behind the retro board:
//!
//! - **store**: Document store boundary with snapshot listeners (memory, SQLite)
//! - **blob**: Blob storage for note images
//! - **scheduler**: Delayed expiry tasks tagged by session
//! - **note**: Standalone note CRUD and the filtered live list
//! - **session**: Retro session lifecycle and expiry worker
//! - **stream**: Restartable live query streams
//! - **repository**: Everything above wired together

pub mod blob;
pub mod clock;
pub mod config;
pub mod error;
pub mod note;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::RetroConfig;
pub use error::{Error, Result};
pub use repository::RetroRepository;
pub use types::*;
