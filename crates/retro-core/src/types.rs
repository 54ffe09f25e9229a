//! Shared types for retro-core.
//!
//! Notes exist in two shapes: [`StandaloneNote`] is the durable top-level
//! document, [`EmbeddedNote`] is the by-value copy a retro session keeps in its
//! note list until the session is confirmed. Both serialize to the same field
//! set so that array-remove by value matches what array-union stored.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Note Types
// ─────────────────────────────────────────────────────────────────────────────

/// Meeting category a note belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    TechnicalDecision,
    Retro,
    Cluster,
}

impl NoteType {
    pub const ALL: [NoteType; 3] = [NoteType::TechnicalDecision, NoteType::Retro, NoteType::Cluster];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::TechnicalDecision => "technical_decision",
            NoteType::Retro => "retro",
            NoteType::Cluster => "cluster",
        }
    }

    /// Human readable meeting name
    pub fn label(&self) -> &'static str {
        match self {
            NoteType::TechnicalDecision => "Technical decision meeting",
            NoteType::Retro => "Retro meeting",
            NoteType::Cluster => "Cluster meeting",
        }
    }
}

impl std::fmt::Display for NoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "technical_decision" => Ok(NoteType::TechnicalDecision),
            "retro" => Ok(NoteType::Retro),
            "cluster" => Ok(NoteType::Cluster),
            _ => Err(format!("Invalid note type: {}", s)),
        }
    }
}

/// Kind of feedback posted on a live retro board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    WentWell,
    ToImprove,
}

impl Feedback {
    pub fn label(&self) -> &'static str {
        match self {
            Feedback::WentWell => "Went well",
            Feedback::ToImprove => "To improve",
        }
    }
}

impl std::str::FromStr for Feedback {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "went_well" | "went-well" => Ok(Feedback::WentWell),
            "to_improve" | "to-improve" => Ok(Feedback::ToImprove),
            _ => Err(format!("Invalid feedback kind: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Note Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Durable, independently addressable note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandaloneNote {
    pub id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub title: String,
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub note_type: NoteType,
}

impl StandaloneNote {
    /// Copy this note by value for embedding in a session.
    pub fn to_embedded(&self) -> EmbeddedNote {
        EmbeddedNote {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            images: self.images.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            timestamp: self.timestamp,
            note_type: self.note_type,
        }
    }
}

/// Denormalized note copy owned by a retro session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedNote {
    pub id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub title: String,
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub note_type: NoteType,
}

impl EmbeddedNote {
    /// Build a board note from a feedback comment.
    ///
    /// The id is left empty; it is assigned when the note is added to a session.
    pub fn feedback(
        user_id: &str,
        username: &str,
        session_title: &str,
        feedback: Feedback,
        comment: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(Error::validation("comment cannot be empty"));
        }

        Ok(Self {
            id: String::new(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            images: Vec::new(),
            title: format!("{} & {}", session_title, feedback.label()),
            description: format!("{}: {}", feedback.label(), comment),
            timestamp,
            note_type: NoteType::Retro,
        })
    }

    /// Promote to a standalone note on confirmation.
    pub fn promote(self) -> StandaloneNote {
        StandaloneNote {
            id: self.id,
            user_id: self.user_id,
            username: self.username,
            images: self.images,
            title: self.title,
            description: self.description,
            timestamp: self.timestamp,
            note_type: self.note_type,
        }
    }
}

impl From<EmbeddedNote> for StandaloneNote {
    fn from(note: EmbeddedNote) -> Self {
        note.promote()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating and updating notes)
// ─────────────────────────────────────────────────────────────────────────────

/// Where an image attached to a note comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Already uploaded; the URL is kept as-is
    Hosted(String),
    /// In-memory bytes uploaded under the given file name
    Bytes { name: String, data: Vec<u8> },
    /// Local file read and uploaded on save
    File(PathBuf),
}

/// Input for creating a new note
#[derive(Debug, Clone)]
pub struct NewNote {
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    pub images: Vec<ImageSource>,
    pub note_type: NoteType,
    /// Defaults to the repository clock when `None`
    pub timestamp: Option<DateTime<Utc>>,
}

/// Input for replacing the editable fields of a note.
///
/// An empty `images` list keeps the images currently stored on the note.
#[derive(Debug, Clone)]
pub struct UpdateNote {
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    pub images: Vec<ImageSource>,
    pub note_type: NoteType,
}

/// Filter for the live note list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    /// Lower bound on the title (`title >= search`)
    pub search: Option<String>,
    pub note_type: Option<NoteType>,
}

impl NoteFilter {
    /// Build a filter from raw UI inputs where an empty string means "any".
    pub fn from_inputs(search: &str, note_type: &str) -> Result<Self> {
        let note_type = if note_type.is_empty() {
            None
        } else {
            Some(note_type.parse::<NoteType>().map_err(Error::Validation)?)
        };

        Ok(Self {
            search: (!search.is_empty()).then(|| search.to_string()),
            note_type,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retro Session
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase of a retro session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Countdown running, participants can post
    #[default]
    Live,
    /// Expired or ended by the admin, waiting for confirmation
    PendingConfirmation,
    /// Notes merged into the standalone collection
    Confirmed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Live => write!(f, "live"),
            SessionPhase::PendingConfirmation => write!(f, "pending_confirmation"),
            SessionPhase::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Timed collaborative retro session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// User that owns the lifecycle controls
    pub admin: String,
    #[serde(default)]
    pub notes: Vec<EmbeddedNote>,
    pub active: bool,
    pub title: String,
    /// Duration in minutes
    pub time: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub phase: SessionPhase,
}

impl Session {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin == user_id
    }

    pub fn is_live(&self) -> bool {
        self.phase == SessionPhase::Live
    }

    /// Time left on the countdown, zero once ended.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if !self.is_live() || self.end_time <= now {
            return Duration::zero();
        }
        self.end_time - now
    }
}

/// Format a countdown as `MM:SS`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", total / 60, total % 60)
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource wrapper for live streams
// ─────────────────────────────────────────────────────────────────────────────

/// Tri-state value emitted by live streams
#[derive(Debug)]
pub enum Resource<T> {
    Loading,
    Success(T),
    Failure(Error),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Resource::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Resource::Loading => Resource::Loading,
            Resource::Success(value) => Resource::Success(f(value)),
            Resource::Failure(err) => Resource::Failure(err),
        }
    }
}

impl<T> From<Result<T>> for Resource<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Resource::Success(value),
            Err(err) => Resource::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_note_type_roundtrip() {
        for note_type in NoteType::ALL {
            assert_eq!(note_type.as_str().parse::<NoteType>().unwrap(), note_type);
        }
        assert!("standup".parse::<NoteType>().is_err());
    }

    #[test]
    fn test_note_serializes_type_and_millis() {
        let note = StandaloneNote {
            id: "n1".into(),
            user_id: "u1".into(),
            username: "ada".into(),
            images: vec![],
            title: "Sprint 12".into(),
            description: "ok".into(),
            timestamp: ts(1_700_000_000),
            note_type: NoteType::Cluster,
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], "cluster");
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_embedded_and_standalone_share_shape() {
        let embedded = EmbeddedNote::feedback("u1", "ada", "Sprint 12", Feedback::ToImprove, "flaky CI", ts(10)).unwrap();
        let embedded_json = serde_json::to_value(&embedded).unwrap();
        let promoted_json = serde_json::to_value(embedded.clone().promote()).unwrap();
        assert_eq!(embedded_json, promoted_json);
        assert_eq!(embedded.title, "Sprint 12 & To improve");
        assert_eq!(embedded.description, "To improve: flaky CI");
        assert_eq!(embedded.note_type, NoteType::Retro);
    }

    #[test]
    fn test_feedback_requires_comment() {
        let err = EmbeddedNote::feedback("u1", "ada", "Sprint", Feedback::WentWell, "   ", ts(0)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_filter_from_inputs() {
        assert_eq!(NoteFilter::from_inputs("", "").unwrap(), NoteFilter::default());

        let filter = NoteFilter::from_inputs("Sprint", "retro").unwrap();
        assert_eq!(filter.search.as_deref(), Some("Sprint"));
        assert_eq!(filter.note_type, Some(NoteType::Retro));

        assert!(NoteFilter::from_inputs("", "standup").unwrap_err().is_validation());
    }

    #[test]
    fn test_remaining_and_format() {
        let session = Session {
            id: "r1".into(),
            admin: "u1".into(),
            notes: vec![],
            active: true,
            title: "Sprint".into(),
            time: 5,
            end_time: ts(300),
            phase: SessionPhase::Live,
        };
        assert_eq!(format_remaining(session.remaining(ts(0))), "05:00");
        assert_eq!(format_remaining(session.remaining(ts(299))), "00:01");
        assert_eq!(format_remaining(session.remaining(ts(301))), "00:00");

        let ended = Session {
            phase: SessionPhase::PendingConfirmation,
            ..session
        };
        assert_eq!(ended.remaining(ts(0)), Duration::zero());
    }

    #[test]
    fn test_session_phase_defaults_to_live() {
        let json = serde_json::json!({
            "id": "r1",
            "admin": "u1",
            "active": true,
            "title": "Sprint",
            "time": 1,
            "end_time": 60_000,
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.phase, SessionPhase::Live);
        assert!(session.notes.is_empty());
    }
}
