//! Command implementations for the retro CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod config;
pub mod note;
pub mod session;

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use retro_core::ImageSource;

/// First 8 characters of an id, for listings.
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// URLs are kept as hosted images, anything else is read as a local file.
pub(crate) fn image_source(arg: &str) -> ImageSource {
    if arg.contains("://") {
        ImageSource::Hosted(arg.to_string())
    } else {
        ImageSource::File(PathBuf::from(arg))
    }
}
