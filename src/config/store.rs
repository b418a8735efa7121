//! Config file persistence
//!
//! Validates and writes the JSON config file atomically, keeping a rolling set
//! of timestamped backups next to it.

use super::file::AppConfig;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Config store errors
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk config file with backup rotation
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    max_backups: usize,
}

impl ConfigStore {
    pub const DEFAULT_MAX_BACKUPS: usize = 3;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_backups: Self::DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the current file
    pub fn load(&self) -> Result<AppConfig, ConfigStoreError> {
        if !self.path.exists() {
            return Err(ConfigStoreError::NotFound(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path)?;
        AppConfig::from_json_str(&content)
            .map_err(|e| ConfigStoreError::Validation(format!("{:#}", e)))
    }

    /// Validate, back up the existing file, then replace it atomically.
    /// Returns the backup path when a previous file existed.
    pub fn save(&self, config: &AppConfig) -> Result<Option<PathBuf>, ConfigStoreError> {
        config
            .validate()
            .map_err(|e| ConfigStoreError::Validation(format!("{:#}", e)))?;

        let backup = if self.path.exists() { Some(self.backup()?) } else { None };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        let tmp_path = self.sibling(&format!("{}.tmp", self.file_name()));
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        info!("Configuration saved to {:?}", self.path);
        Ok(backup)
    }

    /// Copy the current file to `<name>.<timestamp>.bak` and prune old backups
    pub fn backup(&self) -> Result<PathBuf, ConfigStoreError> {
        if !self.path.exists() {
            return Err(ConfigStoreError::NotFound(self.path.clone()));
        }

        let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f").to_string();
        let mut backup_path = self.sibling(&format!("{}.{}.bak", self.file_name(), timestamp));
        let mut attempt = 1;
        while backup_path.exists() {
            backup_path =
                self.sibling(&format!("{}.{}_{}.bak", self.file_name(), timestamp, attempt));
            attempt += 1;
        }

        fs::copy(&self.path, &backup_path)?;
        debug!("Config backup written to {:?}", backup_path);

        self.prune_backups()?;
        Ok(backup_path)
    }

    /// Existing backups, oldest first
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, ConfigStoreError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}.", self.file_name());
        let mut backups: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
                    .unwrap_or(false)
            })
            .collect();

        backups.sort();
        Ok(backups)
    }

    fn prune_backups(&self) -> Result<(), ConfigStoreError> {
        let backups = self.list_backups()?;
        if backups.len() <= self.max_backups {
            return Ok(());
        }

        for old in &backups[..backups.len() - self.max_backups] {
            if let Err(e) = fs::remove_file(old) {
                warn!("Failed to remove old config backup {:?}: {}", old, e);
            }
        }
        Ok(())
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config.json")
            .to_string()
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.path.with_file_name(name)
    }
}
