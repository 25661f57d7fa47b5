//! vault-backup config
//!

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shared::Cadence;
use thiserror::Error;

use crate::{notify::DingTalkConfig, store::S3Config};

/// The program's config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The directory to back up.
    pub backup_dir: PathBuf,

    /// The directory restores are downloaded and extracted into.
    pub restore_dir: PathBuf,

    /// How often the daemon runs a backup.
    pub schedule: Cadence,

    /// Archive encryption.
    pub encryption: EncryptionConfig,

    /// Where archives are stored.
    pub store: StoreConfig,

    /// Where notifications are sent.
    pub ding_talk: DingTalkConfig,
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: &Path) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile(file_path.to_path_buf()));
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config = toml::from_str(&contents)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./vault"),
            restore_dir: PathBuf::from("./restore"),
            schedule: Cadence::default(),
            encryption: EncryptionConfig::default(),
            store: StoreConfig::default(),
            ding_talk: DingTalkConfig::default(),
        }
    }
}

/// Archive encryption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Encrypt archives with a generated password.
    pub enabled: bool,

    /// Length of the generated password, which is the AES key, so one of 16, 24 or 32.
    pub password_length: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            password_length: 32,
        }
    }
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The key prefix archives are stored under.
    pub prefix: String,

    /// The bucket connection.
    #[serde(flatten)]
    pub connection: S3Config,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: "backup".to_string(),
            connection: S3Config::default(),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file {0:?} does not exist.")]
    NoFile(PathBuf),

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),
}
