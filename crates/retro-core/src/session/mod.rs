//! Retro session lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! create_session
//!   │  persist (active, live), schedule expiry tagged with the session id
//!   ▼
//! Live ──extend_session──► Live      (write first, then cancel + reschedule)
//!   │
//!   ├─► expiry fires  ──► PendingConfirmation   (active stays true)
//!   └─► end_session   ──► PendingConfirmation   (expiry cancelled)
//!                             │
//!                             ▼
//!                        confirm_session ──► Confirmed (active = false,
//!                                             embedded notes upserted)
//! ```
//!
//! Expiry tasks are delivered by the scheduler to an [`ExpiryWorker`], which
//! calls [`SessionLifecycle::expire_session`].

mod expiry;
mod lifecycle;

pub use expiry::*;
pub use lifecycle::*;

use crate::error::{Error, Result};

/// Configuration for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    /// Collection holding retro sessions.
    pub sessions_collection: String,
    /// Collection confirmed notes are promoted into.
    pub notes_collection: String,
    /// Collection holding user profiles.
    pub users_collection: String,
    /// Upper bound for create and extend, in minutes.
    pub max_duration_minutes: u32,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            sessions_collection: "retro".to_string(),
            notes_collection: "notes".to_string(),
            users_collection: "users".to_string(),
            max_duration_minutes: 24 * 60,
        }
    }
}

/// Parse a duration typed by the admin, in whole minutes.
pub fn parse_duration_minutes(input: &str) -> Result<u32> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::validation("duration cannot be empty"));
    }
    let minutes: u32 = input
        .parse()
        .map_err(|_| Error::validation(format!("duration must be a whole number of minutes: {}", input)))?;
    if minutes == 0 {
        return Err(Error::validation("duration must be greater than 0"));
    }
    Ok(minutes)
}
