//! Session repository: note and session services over shared backends.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::config::RetroConfig;
use crate::note::{NoteService, NoteServiceConfig};
use crate::scheduler::TaskScheduler;
use crate::session::{SessionLifecycle, SessionServiceConfig};
use crate::store::DocumentStore;

/// Note CRUD and the session lifecycle, sharing one store and clock.
pub struct RetroRepository {
    notes: NoteService,
    sessions: Arc<SessionLifecycle>,
}

impl RetroRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        scheduler: Arc<dyn TaskScheduler>,
        clock: Arc<dyn Clock>,
        config: &RetroConfig,
    ) -> Self {
        let notes = NoteService::new(
            Arc::clone(&store),
            blobs,
            Arc::clone(&clock),
            NoteServiceConfig::with_collection(config.collections.notes.as_str()),
        );
        let sessions = SessionLifecycle::new(
            store,
            scheduler,
            clock,
            SessionServiceConfig {
                sessions_collection: config.collections.sessions.clone(),
                notes_collection: config.collections.notes.clone(),
                users_collection: config.collections.users.clone(),
                max_duration_minutes: config.session.max_duration_minutes,
            },
        );

        Self {
            notes,
            sessions: Arc::new(sessions),
        }
    }

    pub fn notes(&self) -> &NoteService {
        &self.notes
    }

    pub fn sessions(&self) -> &SessionLifecycle {
        &self.sessions
    }

    /// Shared handle for the expiry worker.
    pub fn sessions_handle(&self) -> Arc<SessionLifecycle> {
        Arc::clone(&self.sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::clock::FixedClock;
    use crate::scheduler::TokioScheduler;
    use crate::store::MemoryDocumentStore;
    use crate::types::{EmbeddedNote, Feedback, NewNote, NoteType};
    use chrono::{TimeZone, Utc};

    fn repository(config: &RetroConfig) -> RetroRepository {
        let (scheduler, _fired) = TokioScheduler::new();
        RetroRepository::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(scheduler),
            Arc::new(FixedClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
            config,
        )
    }

    #[tokio::test]
    async fn test_confirm_overwrites_note_with_same_id() {
        let repo = repository(&RetroConfig::default());

        let note = repo
            .notes()
            .add_note(NewNote {
                user_id: "u1".into(),
                username: "ada".into(),
                title: "Original".into(),
                description: "written first".into(),
                images: vec![],
                note_type: NoteType::Cluster,
                timestamp: None,
            })
            .await
            .unwrap();

        let mut embedded = EmbeddedNote::feedback(
            "u2",
            "grace",
            "Sprint 12",
            Feedback::ToImprove,
            "written last",
            Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        )
        .unwrap();
        embedded.id = note.id.clone();

        let session_id = repo
            .sessions()
            .create_session("u1", vec![embedded.clone()], "Sprint 12", 5)
            .await
            .unwrap();
        repo.sessions().confirm_session(&session_id).await.unwrap();

        let stored = repo.notes().get_note(&note.id).await.unwrap().unwrap();
        assert_eq!(stored, embedded.promote());
    }

    #[tokio::test]
    async fn test_collections_follow_config() {
        let mut config = RetroConfig::default();
        config.collections.notes = "archive".into();
        config.collections.sessions = "meetings".into();
        let repo = repository(&config);

        assert_eq!(repo.notes().collection(), "archive");
        assert_eq!(repo.sessions().config().sessions_collection, "meetings");
        assert_eq!(repo.sessions().config().notes_collection, "archive");
    }
}
