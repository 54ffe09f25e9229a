//! Session lifecycle operations.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::scheduler::{ExpiryPayload, TaskScheduler};
use crate::store::{DocumentStore, Fields, Query};
use crate::stream::LiveQuery;
use crate::types::{format_remaining, EmbeddedNote, Resource, Session, SessionPhase};

use super::SessionServiceConfig;

/// Owns the create / extend / expire / end / confirm flow of retro sessions.
///
/// At most one session is expected to be active at a time, but nothing here
/// enforces it: two admins creating sessions concurrently both succeed.
pub struct SessionLifecycle {
    store: Arc<dyn DocumentStore>,
    scheduler: Arc<dyn TaskScheduler>,
    clock: Arc<dyn Clock>,
    config: SessionServiceConfig,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        scheduler: Arc<dyn TaskScheduler>,
        clock: Arc<dyn Clock>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionServiceConfig {
        &self.config
    }

    fn collection(&self) -> &str {
        &self.config.sessions_collection
    }

    fn validate_duration(&self, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(Error::validation("duration must be greater than 0"));
        }
        if minutes > self.config.max_duration_minutes {
            return Err(Error::validation(format!(
                "duration cannot exceed {} minutes",
                self.config.max_duration_minutes
            )));
        }
        Ok(())
    }

    fn expiry_payload(session_id: &str) -> ExpiryPayload {
        ExpiryPayload {
            session_id: session_id.to_string(),
        }
    }

    /// Replace whatever expiry is pending for the session with one after `delay`.
    async fn reschedule_expiry(&self, session_id: &str, delay: StdDuration) -> Result<u64> {
        self.scheduler
            .reschedule(session_id, delay, Self::expiry_payload(session_id))
            .await
    }

    fn until_end(&self, session: &Session) -> StdDuration {
        (session.end_time - self.clock.now())
            .to_std()
            .unwrap_or(StdDuration::ZERO)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Create a live session and schedule its expiry.
    ///
    /// Initial notes without an id get one.
    pub async fn create_session(
        &self,
        admin: &str,
        initial_notes: Vec<EmbeddedNote>,
        title: &str,
        duration_minutes: u32,
    ) -> Result<String> {
        if admin.trim().is_empty() {
            return Err(Error::validation("admin cannot be blank"));
        }
        if title.trim().is_empty() {
            return Err(Error::validation("session title cannot be blank"));
        }
        self.validate_duration(duration_minutes)?;

        let id = self.store.new_id(self.collection());
        let notes = initial_notes
            .into_iter()
            .map(|mut note| {
                if note.id.is_empty() {
                    note.id = self.store.new_id(&self.config.notes_collection);
                }
                note
            })
            .collect();

        let session = Session {
            id: id.clone(),
            admin: admin.to_string(),
            notes,
            active: true,
            title: title.to_string(),
            time: duration_minutes,
            end_time: self.clock.now() + minutes(duration_minutes),
            phase: SessionPhase::Live,
        };

        self.store
            .set(self.collection(), &id, serde_json::to_value(&session)?)
            .await?;
        self.scheduler
            .schedule(&id, std_minutes(duration_minutes), Self::expiry_payload(&id))
            .await?;

        info!(session_id = %id, admin = %admin, minutes = duration_minutes, "Retro session created");
        Ok(id)
    }

    /// Restart the countdown at `now + minutes`.
    ///
    /// The new end time is written first; pending expiries are replaced by a
    /// fresh one only once the write succeeded. Returns the new end time.
    pub async fn extend_session(&self, session_id: &str, new_duration_minutes: u32) -> Result<DateTime<Utc>> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }
        self.validate_duration(new_duration_minutes)?;

        let session = self.require_session(session_id).await?;
        if session.phase == SessionPhase::Confirmed {
            return Err(Error::validation(format!("session {} is already confirmed", session_id)));
        }

        let end_time = self.clock.now() + minutes(new_duration_minutes);
        let mut fields = Fields::new();
        fields.insert("time".into(), Value::from(new_duration_minutes));
        fields.insert("end_time".into(), Value::from(end_time.timestamp_millis()));
        fields.insert("phase".into(), phase_value(SessionPhase::Live));

        self.store
            .update(self.collection(), session_id, fields)
            .await
            .map_err(|e| session_not_found(e, session_id))?;

        let task_id = self
            .reschedule_expiry(session_id, std_minutes(new_duration_minutes))
            .await?;

        info!(session_id = %session_id, minutes = new_duration_minutes, task_id, "Retro session extended");
        Ok(end_time)
    }

    /// Expiry callback: move a live session to pending confirmation.
    ///
    /// Returns whether the session changed. Missing sessions and sessions no
    /// longer live are ignored. A delivery that arrives before the stored end
    /// time, e.g. after an extend from another process, re-arms the expiry
    /// for the remaining time.
    pub async fn expire_session(&self, session_id: &str) -> Result<bool> {
        let Some(session) = self.get_session(session_id).await? else {
            debug!(session_id = %session_id, "Expiry for missing session ignored");
            return Ok(false);
        };

        if session.phase != SessionPhase::Live {
            debug!(session_id = %session_id, phase = %session.phase, "Expiry for ended session ignored");
            return Ok(false);
        }
        if session.end_time > self.clock.now() {
            let delay = self.until_end(&session);
            self.reschedule_expiry(session_id, delay).await?;
            debug!(session_id = %session_id, delay_secs = delay.as_secs(), "Early expiry, re-armed");
            return Ok(false);
        }

        self.set_phase(session_id, SessionPhase::PendingConfirmation).await?;
        info!(session_id = %session_id, "Retro session expired");
        Ok(true)
    }

    /// Admin end: stop the countdown and wait for confirmation.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }

        let session = self.require_session(session_id).await?;
        self.scheduler.cancel_by_tag(session_id).await?;

        if session.phase == SessionPhase::Live {
            self.set_phase(session_id, SessionPhase::PendingConfirmation).await?;
            info!(session_id = %session_id, "Retro session ended");
        }
        Ok(())
    }

    /// Promote every embedded note to a standalone note and close the session.
    ///
    /// Notes are upserted by id, so a standalone note with the same id is
    /// overwritten. Confirming an already confirmed session writes nothing.
    /// Returns the number of notes promoted.
    pub async fn confirm_session(&self, session_id: &str) -> Result<usize> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }

        let session = self.require_session(session_id).await?;
        if session.phase == SessionPhase::Confirmed && !session.active {
            debug!(session_id = %session_id, "Session already confirmed");
            return Ok(0);
        }

        let count = session.notes.len();
        for note in session.notes {
            let mut standalone = note.promote();
            if standalone.id.is_empty() {
                standalone.id = self.store.new_id(&self.config.notes_collection);
            }
            self.store
                .set(
                    &self.config.notes_collection,
                    &standalone.id,
                    serde_json::to_value(&standalone)?,
                )
                .await?;
        }

        let mut fields = Fields::new();
        fields.insert("active".into(), Value::Bool(false));
        fields.insert("phase".into(), phase_value(SessionPhase::Confirmed));
        self.store
            .update(self.collection(), session_id, fields)
            .await
            .map_err(|e| session_not_found(e, session_id))?;

        self.scheduler.cancel_by_tag(session_id).await?;

        info!(session_id = %session_id, notes = count, "Retro session confirmed");
        Ok(count)
    }

    /// Re-arm the expiry of a live session from its stored end time.
    ///
    /// Scheduled tasks do not survive a restart; this puts one back. A
    /// session already past its end time expires right away.
    pub async fn rearm_expiry(&self, session_id: &str) -> Result<bool> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };
        if session.phase != SessionPhase::Live {
            return Ok(false);
        }

        let delay = self.until_end(&session);
        self.reschedule_expiry(session_id, delay).await?;

        debug!(session_id = %session_id, delay_secs = delay.as_secs(), "Expiry re-armed");
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Board notes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Add a note to the board with a fresh id, returning it as stored.
    pub async fn add_note_to_session(&self, session_id: &str, note: EmbeddedNote) -> Result<EmbeddedNote> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }

        let note = EmbeddedNote {
            id: self.store.new_id(&self.config.notes_collection),
            ..note
        };
        self.store
            .array_union(self.collection(), session_id, "notes", vec![serde_json::to_value(&note)?])
            .await
            .map_err(|e| session_not_found(e, session_id))?;

        debug!(session_id = %session_id, note_id = %note.id, "Note added to session");
        Ok(note)
    }

    /// Remove a note from the board.
    ///
    /// Matching is by whole value: a copy that differs in any field from the
    /// stored note removes nothing.
    pub async fn remove_note_from_session(&self, session_id: &str, note: &EmbeddedNote) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }

        self.store
            .array_remove(self.collection(), session_id, "notes", vec![serde_json::to_value(note)?])
            .await
            .map_err(|e| session_not_found(e, session_id))?;

        debug!(session_id = %session_id, note_id = %note.id, "Note removed from session");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session id cannot be blank"));
        }
        match self.store.get(self.collection(), session_id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<Session> {
        self.get_session(session_id)
            .await?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Sessions currently flagged active.
    pub async fn active_sessions(&self) -> Result<Vec<Session>> {
        self.store
            .query(&self.active_query())
            .await?
            .iter()
            .map(|doc| doc.decode::<Session>())
            .collect()
    }

    fn active_query(&self) -> Query {
        Query::collection(self.collection()).where_eq("active", true)
    }

    /// Id of the first active session, each time the active set is non-empty.
    ///
    /// Listener errors and empty snapshots emit nothing.
    pub fn active_session_id(&self) -> LiveQuery<String> {
        LiveQuery::new(Arc::clone(&self.store), self.active_query(), |event| {
            event.ok().and_then(|docs| docs.first().map(|doc| doc.id.clone()))
        })
    }

    /// Whether any session is active. Listener errors map to `false`.
    pub fn is_session_active(&self) -> LiveQuery<bool> {
        LiveQuery::new(Arc::clone(&self.store), self.active_query(), |event| {
            Some(event.map(|docs| !docs.is_empty()).unwrap_or(false))
        })
    }

    /// Live feed of one session, `None` while it does not exist.
    pub fn watch_session(&self, session_id: &str) -> LiveQuery<Resource<Option<Session>>> {
        let query = Query::collection(self.collection()).where_eq("id", session_id);
        LiveQuery::new(Arc::clone(&self.store), query, |event| {
            let session = event.and_then(|docs| docs.first().map(|doc| doc.decode::<Session>()).transpose());
            Some(Resource::from(session))
        })
        .starting_with(|| Resource::Loading)
    }

    /// Display name of a user, `None` when missing or unreadable.
    pub async fn username(&self, user_id: &str) -> Option<String> {
        if user_id.trim().is_empty() {
            return None;
        }
        match self.store.get(&self.config.users_collection, user_id).await {
            Ok(doc) => doc.and_then(|doc| doc.field("username").and_then(Value::as_str).map(str::to_string)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read user profile");
                None
            }
        }
    }

    /// Countdown of a session as `MM:SS` against the lifecycle clock.
    pub fn countdown(&self, session: &Session) -> String {
        format_remaining(session.remaining(self.clock.now()))
    }

    async fn set_phase(&self, session_id: &str, phase: SessionPhase) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("phase".into(), phase_value(phase));
        self.store
            .update(self.collection(), session_id, fields)
            .await
            .map_err(|e| session_not_found(e, session_id))
    }
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(i64::from(m))
}

fn std_minutes(m: u32) -> StdDuration {
    StdDuration::from_secs(u64::from(m) * 60)
}

fn phase_value(phase: SessionPhase) -> Value {
    Value::String(phase.to_string())
}

fn session_not_found(err: Error, id: &str) -> Error {
    match err {
        Error::DocumentNotFound { .. } => Error::SessionNotFound(id.to_string()),
        other => other,
    }
}
