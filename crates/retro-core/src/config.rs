//! Configuration for the retro repository.
//!
//! Configuration is loaded with precedence:
//! 1. `RETRO_CONFIG` (explicit config file path)
//! 2. `<data dir>/config.toml`, where `RETRO_DATA_DIR` overrides the data dir
//! 3. Default values

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetroConfig {
    /// Document collection names
    #[serde(default)]
    pub collections: CollectionsConfig,

    /// Session defaults and limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_notes_collection")]
    pub notes: String,

    #[serde(default = "default_sessions_collection")]
    pub sessions: String,

    #[serde(default = "default_users_collection")]
    pub users: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Duration used when none is given, in minutes
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,

    /// Upper bound accepted for create/extend, in minutes
    #[serde(default = "default_max_duration_minutes")]
    pub max_duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for retro data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite document database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory holding uploaded images
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
}

// Default value functions
fn default_notes_collection() -> String {
    "notes".to_string()
}

fn default_sessions_collection() -> String {
    "retro".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_duration_minutes() -> u32 {
    15
}

fn default_max_duration_minutes() -> u32 {
    24 * 60
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RETRO_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".retro")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("retro.db")
}

fn default_blob_dir() -> PathBuf {
    default_data_dir().join("blobs")
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            notes: default_notes_collection(),
            sessions: default_sessions_collection(),
            users: default_users_collection(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: default_duration_minutes(),
            max_duration_minutes: default_max_duration_minutes(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            blob_dir: default_blob_dir(),
        }
    }
}

impl Default for RetroConfig {
    fn default() -> Self {
        Self {
            collections: CollectionsConfig::default(),
            session: SessionConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl RetroConfig {
    /// Load configuration from file, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults when it is missing.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("RETRO_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.max_duration_minutes == 0 {
            return Err(Error::Config("session.max_duration_minutes must be greater than 0".into()));
        }
        if self.session.default_duration_minutes == 0
            || self.session.default_duration_minutes > self.session.max_duration_minutes
        {
            return Err(Error::Config(format!(
                "session.default_duration_minutes must be between 1 and {}",
                self.session.max_duration_minutes
            )));
        }
        for (field, name) in [
            ("collections.notes", &self.collections.notes),
            ("collections.sessions", &self.collections.sessions),
            ("collections.users", &self.collections.users),
        ] {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("{} cannot be empty", field)));
            }
        }
        Ok(())
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)?;
        std::fs::create_dir_all(&self.paths.blob_dir)?;
        if let Some(parent) = self.paths.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RetroConfig::default();
        assert_eq!(config.collections.notes, "notes");
        assert_eq!(config.collections.sessions, "retro");
        assert_eq!(config.collections.users, "users");
        assert_eq!(config.session.default_duration_minutes, 15);
        assert!(config.paths.database_path.ends_with("retro.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = RetroConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.max_duration_minutes, 24 * 60);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[collections]
sessions = "meetings"

[session]
default_duration_minutes = 30
"#,
        )
        .unwrap();

        let config = RetroConfig::load_from(&path).unwrap();
        assert_eq!(config.collections.sessions, "meetings");
        assert_eq!(config.collections.notes, "notes");
        assert_eq!(config.session.default_duration_minutes, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\ndefault_duration_minutes = 0\n").unwrap();
        assert!(matches!(RetroConfig::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "[session\n").unwrap();
        assert!(matches!(RetroConfig::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempdir().unwrap();
        let mut config = RetroConfig::default();
        config.paths.data_dir = dir.path().join("data");
        config.paths.blob_dir = dir.path().join("data/blobs");
        config.paths.database_path = dir.path().join("data/db/retro.db");

        config.ensure_dirs().unwrap();
        assert!(dir.path().join("data/blobs").is_dir());
        assert!(dir.path().join("data/db").is_dir());
    }
}
