//! Backup history
//!

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use shared::Cadence;
use thiserror::Error;
use tracing::warn;

/// When the last successful backup ran, persisted as json.
#[derive(Debug, Deserialize, Serialize)]
pub struct History {
    /// The time of the last successful backup.
    pub last_backup: Option<SystemTime>,

    #[serde(skip)]
    path: PathBuf,
}

impl History {
    /// Tries to load the history from a json file, creating an empty history if there is none.
    pub fn load_or_create(path: &Path) -> Result<Self, LoadHistoryError> {
        if !path.exists() {
            let history = Self {
                last_backup: None,
                path: path.to_path_buf(),
            };
            history.save()?;
            return Ok(history);
        }

        let contents = fs::read_to_string(path).map_err(LoadHistoryError::ReadFile)?;
        let mut history: Self = serde_json::from_str(&contents)?;
        history.path = path.to_path_buf();

        Ok(history)
    }

    /// Returns if a backup is due for `cadence`.
    pub fn needs_backup(&self, cadence: Cadence) -> bool {
        let last_backed_up = match self.last_backup {
            Some(backed_up) => backed_up,
            None => return true,
        };

        let elapsed = match SystemTime::now().duration_since(last_backed_up) {
            Ok(elapsed) => elapsed,
            Err(error) => {
                warn!("System time may have changed: {error}");
                return true;
            }
        };

        elapsed >= cadence.interval()
    }

    /// Record a successful backup now and save.
    pub fn update(&mut self) -> Result<(), SaveHistoryError> {
        self.last_backup = Some(SystemTime::now());
        self.save()
    }

    /// Save the current history.
    pub fn save(&self) -> Result<(), SaveHistoryError> {
        let contents = serde_json::to_string(self)?;
        fs::write(&self.path, contents).map_err(SaveHistoryError::WriteFile)?;
        Ok(())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadHistoryError {
    #[error("Failed to deserialize history: {0}")]
    Deserialize(#[from] serde_json::error::Error),

    #[error("Failed to read history: {0}")]
    ReadFile(#[source] io::Error),

    #[error("Failed to create new history file: {0}")]
    CreateHistory(#[from] SaveHistoryError),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SaveHistoryError {
    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::error::Error),

    #[error("Failed to write history file: {0}")]
    WriteFile(#[source] io::Error),
}
