//! Error types for the retro CLI.

use thiserror::Error;

/// Errors raised by the CLI itself, before or around core calls.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("No user given. Pass --user or set RETRO_USER.")]
    MissingUser,

    #[error("Only the session admin ({admin}) can {action}")]
    NotAdmin { admin: String, action: &'static str },

    #[error("No active retro session")]
    NoActiveSession,

    #[error("Retro session not found: {0}")]
    SessionNotFound(String),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("Note {note_id} is not on session {session_id}")]
    NoteNotOnBoard { session_id: String, note_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CliError::NotAdmin {
            admin: "u1".into(),
            action: "extend the session",
        };
        assert_eq!(err.to_string(), "Only the session admin (u1) can extend the session");
        assert!(CliError::MissingUser.to_string().contains("RETRO_USER"));
    }
}
