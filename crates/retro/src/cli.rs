//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use retro_core::{Feedback, NoteType};

/// Retro Board CLI
///
/// Standalone notes and timed retro sessions.
#[derive(Parser, Debug)]
#[command(name = "retro")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to $RETRO_CONFIG or <data dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub identity: Identity,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who is acting.
#[derive(Args, Debug, Clone)]
pub struct Identity {
    /// Acting user id
    #[arg(long, env = "RETRO_USER", global = true)]
    pub user: Option<String>,

    /// Display name (defaults to the user profile, then the user id)
    #[arg(long, env = "RETRO_USERNAME", global = true)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Standalone notes
    Note(NoteCommand),

    /// Timed retro sessions
    Session(SessionCommand),

    /// Show the effective configuration
    Config,

    /// Show version
    Version,
}

/// Meeting type accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeetingType {
    TechnicalDecision,
    Retro,
    Cluster,
}

impl From<MeetingType> for NoteType {
    fn from(value: MeetingType) -> Self {
        match value {
            MeetingType::TechnicalDecision => NoteType::TechnicalDecision,
            MeetingType::Retro => NoteType::Retro,
            MeetingType::Cluster => NoteType::Cluster,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackKind {
    WentWell,
    ToImprove,
}

impl From<FeedbackKind> for Feedback {
    fn from(value: FeedbackKind) -> Self {
        match value {
            FeedbackKind::WentWell => Feedback::WentWell,
            FeedbackKind::ToImprove => Feedback::ToImprove,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Note Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct NoteCommand {
    #[command(subcommand)]
    pub action: NoteAction,
}

#[derive(Subcommand, Debug)]
pub enum NoteAction {
    /// Create a note
    Add {
        /// Note title
        #[arg(short, long)]
        title: String,

        /// Note body
        #[arg(short, long, default_value = "")]
        description: String,

        /// Meeting type
        #[arg(long = "type", value_enum, default_value = "retro")]
        note_type: MeetingType,

        /// Image file or already hosted URL (repeatable)
        #[arg(short, long = "image")]
        images: Vec<String>,
    },

    /// List notes ordered by time
    List {
        /// Keep titles sorting at or after this text
        #[arg(short, long)]
        search: Option<String>,

        /// Only this meeting type
        #[arg(long = "type", value_enum)]
        note_type: Option<MeetingType>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one note
    Show {
        note_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a note; omitted fields keep their value
    Update {
        note_id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long = "type", value_enum)]
        note_type: Option<MeetingType>,

        /// Replace the images (repeatable); omit to keep them
        #[arg(short, long = "image")]
        images: Vec<String>,
    },

    /// Delete a note
    Delete { note_id: String },

    /// Delete one image from a note
    DeleteImage { note_id: String, url: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a retro session as its admin
    Start {
        /// Session title
        #[arg(short, long)]
        title: String,

        /// Duration in minutes (defaults to the configured duration)
        #[arg(short, long)]
        minutes: Option<String>,
    },

    /// Restart the countdown with a new duration
    Extend {
        session_id: String,

        /// New duration in minutes, counted from now
        #[arg(short, long)]
        minutes: String,
    },

    /// Post feedback to the board
    Add {
        session_id: String,

        #[arg(short, long, value_enum)]
        feedback: FeedbackKind,

        /// Feedback text
        comment: String,
    },

    /// Remove a note from the board
    Remove { session_id: String, note_id: String },

    /// End the session early
    End { session_id: String },

    /// Promote the board notes and close the session
    Confirm { session_id: String },

    /// Show a session
    Show {
        session_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show whether a session is active
    Status,

    /// Follow a session live, applying expiry while running
    Watch {
        /// Session to follow (defaults to the active one)
        session_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_note_add() {
        let cli = Cli::try_parse_from([
            "retro", "--user", "u1", "note", "add", "--title", "Sprint 12", "--type", "cluster", "-i", "a.png", "-i",
            "b.png",
        ])
        .unwrap();

        assert_eq!(cli.identity.user.as_deref(), Some("u1"));
        match cli.command {
            Commands::Note(NoteCommand {
                action: NoteAction::Add {
                    title,
                    note_type,
                    images,
                    ..
                },
            }) => {
                assert_eq!(title, "Sprint 12");
                assert_eq!(NoteType::from(note_type), NoteType::Cluster);
                assert_eq!(images, vec!["a.png", "b.png"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_session_add_feedback() {
        let cli = Cli::try_parse_from(["retro", "session", "add", "r1", "--feedback", "to-improve", "flaky CI"]).unwrap();
        match cli.command {
            Commands::Session(SessionCommand {
                action: SessionAction::Add {
                    session_id,
                    feedback,
                    comment,
                },
            }) => {
                assert_eq!(session_id, "r1");
                assert_eq!(Feedback::from(feedback), Feedback::ToImprove);
                assert_eq!(comment, "flaky CI");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
