//! Backends and identity for one CLI invocation.
//!
//! Every command runs against the SQLite document store and the local blob
//! directory named by the configuration. Scheduled expiries only live as long
//! as the process; `session watch` re-arms them from the stored end time.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use retro_core::blob::LocalBlobStore;
use retro_core::clock::SystemClock;
use retro_core::scheduler::{ExpiryPayload, TokioScheduler};
use retro_core::store::SqliteDocumentStore;
use retro_core::{RetroConfig, RetroRepository};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::Identity;
use crate::error::CliError;

pub struct Context {
    pub repo: RetroRepository,
    pub scheduler: Arc<TokioScheduler>,
    fired: Option<mpsc::UnboundedReceiver<ExpiryPayload>>,
    identity: Identity,
}

impl Context {
    /// Open the configured store and blob directory.
    pub fn open(config: &RetroConfig, identity: &Identity) -> Result<Self> {
        config.ensure_dirs().context("Failed to create data directories")?;

        let store = SqliteDocumentStore::open_path(&config.paths.database_path).with_context(|| {
            format!("Failed to open database at {}", config.paths.database_path.display())
        })?;
        let blobs = LocalBlobStore::new(&config.paths.blob_dir);
        let (scheduler, fired) = TokioScheduler::new();
        let scheduler = Arc::new(scheduler);

        let repo = RetroRepository::new(
            Arc::new(store),
            Arc::new(blobs),
            scheduler.clone(),
            Arc::new(SystemClock),
            config,
        );

        debug!(database = %config.paths.database_path.display(), "Opened retro store");
        Ok(Self {
            repo,
            scheduler,
            fired: Some(fired),
            identity: identity.clone(),
        })
    }

    /// The acting user id.
    pub fn user(&self) -> Result<&str> {
        self.identity
            .user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CliError::MissingUser.into())
    }

    /// Display name: explicit flag, then the user profile, then the id.
    pub async fn username(&self) -> Result<String> {
        if let Some(name) = self.identity.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Ok(name.to_string());
        }
        let user = self.user()?;
        Ok(self
            .repo
            .sessions()
            .username(user)
            .await
            .unwrap_or_else(|| user.to_string()))
    }

    /// Receiver of fired expiries; only the first caller gets it.
    pub fn take_fired(&mut self) -> Option<mpsc::UnboundedReceiver<ExpiryPayload>> {
        self.fired.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    fn config_in(dir: &std::path::Path) -> RetroConfig {
        let mut config = RetroConfig::default();
        config.paths.data_dir = dir.to_path_buf();
        config.paths.database_path = dir.join("retro.db");
        config.paths.blob_dir = dir.join("blobs");
        config
    }

    #[tokio::test]
    async fn test_open_creates_store() {
        let dir = tempdir().unwrap();
        let identity = Identity {
            user: Some("u1".into()),
            name: None,
        };
        let mut ctx = assert_ok!(Context::open(&config_in(dir.path()), &identity));

        assert!(dir.path().join("retro.db").exists());
        assert!(dir.path().join("blobs").is_dir());
        assert_eq!(ctx.user().unwrap(), "u1");
        assert_eq!(ctx.username().await.unwrap(), "u1");
        assert!(ctx.take_fired().is_some());
        assert!(ctx.take_fired().is_none());
    }

    #[tokio::test]
    async fn test_missing_user() {
        let dir = tempdir().unwrap();
        let identity = Identity {
            user: Some("  ".into()),
            name: Some("Ada".into()),
        };
        let ctx = Context::open(&config_in(dir.path()), &identity).unwrap();
        assert_err!(ctx.user());
        assert_eq!(ctx.username().await.unwrap(), "Ada");
    }
}
