//! Consumer of fired expiry tasks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::scheduler::ExpiryPayload;

use super::SessionLifecycle;

/// Applies fired expiry payloads to their sessions.
pub struct ExpiryWorker {
    sessions: Arc<SessionLifecycle>,
    fired: mpsc::UnboundedReceiver<ExpiryPayload>,
}

impl ExpiryWorker {
    pub fn new(sessions: Arc<SessionLifecycle>, fired: mpsc::UnboundedReceiver<ExpiryPayload>) -> Self {
        Self { sessions, fired }
    }

    /// Run on a background task. The worker holds the lifecycle, and with it
    /// the scheduler's sender, so it stops only when the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(payload) = self.fired.recv().await {
            match self.sessions.expire_session(&payload.session_id).await {
                Ok(true) => info!(session_id = %payload.session_id, "Expiry applied"),
                Ok(false) => debug!(session_id = %payload.session_id, "Expiry had no effect"),
                Err(e) => error!(session_id = %payload.session_id, error = %e, "Failed to expire session"),
            }
        }
        debug!("Expiry worker stopped");
    }
}
