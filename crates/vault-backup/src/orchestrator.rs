//! The backup and restore flows.
//!
//! Backup: `Compressing -> (Encrypting) -> Uploading -> NotifyingSuccess | NotifyingFailure`.
//! Restore: `Listing -> AwaitingSelection -> Downloading -> (Decrypting) -> Extracting`.
//!

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use shared::LogProgress;
use thiserror::Error;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::{
    archive::{self, ArchiveError},
    cipher::{self, CipherError, EncryptedPayload},
    context::Context,
    notify::{Notifier, NotifyError},
    select::{SelectError, Selector},
    store::{ObjectStore, TransferError},
};

/// Title of the message sent after a successful backup.
pub const SUCCESS_TITLE: &str = "Vault backup succeeded";
/// Title of the message sent after a failed backup.
pub const FAILURE_TITLE: &str = "Vault backup failed";
/// The only detail a failure message carries, the error itself is logged.
pub const FAILURE_MESSAGE: &str = "archive or upload failed, check logs";

/// What a run works on.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The directory to back up.
    pub backup_dir: PathBuf,

    /// The directory restores are downloaded and extracted into.
    pub restore_dir: PathBuf,

    /// The key prefix archives are stored under, without a trailing `/`.
    pub prefix: String,

    /// Encrypt backups with a generated password of this length.
    pub password_length: Option<usize>,

    /// Decrypt restored archives with this password before extracting them.
    pub restore_password: Option<Zeroizing<String>>,
}

/// A finished backup, only kept long enough to notify the operator.
struct BackupRecord {
    started: DateTime<Local>,
    key: String,
    password: Option<Zeroizing<String>>,
    url: String,
}

/// Runs backups and restores against injected collaborators.
pub struct Orchestrator<S, N, P> {
    settings: Settings,
    store: S,
    notifier: N,
    selector: P,
}

/// The key a backup started at `started` is stored under.
pub fn output_key(prefix: &str, started: DateTime<Local>) -> String {
    format!(
        "{prefix}/{}_bitwarden.zip",
        started.format("%Y-%m-%d_%H:%M")
    )
}

impl<S: ObjectStore, N: Notifier, P: Selector> Orchestrator<S, N, P> {
    /// Create an orchestrator.
    pub fn new(settings: Settings, store: S, notifier: N, selector: P) -> Self {
        Self {
            settings,
            store,
            notifier,
            selector,
        }
    }

    /// Back up the backup directory now and notify the operator of the outcome.
    pub fn run_backup(&self) -> Result<(), BackupError> {
        self.run_backup_at(Local::now())
    }

    /// Back up the backup directory as if started at `started`.
    ///
    /// A failed backup is returned even when the failure message could not be sent.
    pub fn run_backup_at(&self, started: DateTime<Local>) -> Result<(), BackupError> {
        let mut context = Context::new("Backup");
        let key = output_key(&self.settings.prefix, started);
        info!(
            "{context}Backing up {:?} to '{key}'",
            self.settings.backup_dir
        );

        let record = match self.archive_and_upload(&mut context, started, key) {
            Ok(record) => record,
            Err(error) => {
                error!("{context}{error}");

                context.current_context = "NotifyingFailure";
                if let Err(notify_error) =
                    self.notifier.send_message(FAILURE_TITLE, FAILURE_MESSAGE)
                {
                    warn!("{context}Could not send failure message: {notify_error}");
                }

                return Err(error);
            }
        };

        context.current_context = "NotifyingSuccess";
        let message = success_message(&record);
        self.notifier
            .send_message(SUCCESS_TITLE, &message)
            .inspect_err(|e| error!("{context}Could not send success message: {e}"))?;

        info!("{context}Backed up to '{}'", record.key);
        Ok(())
    }

    fn archive_and_upload(
        &self,
        context: &mut Context,
        started: DateTime<Local>,
        key: String,
    ) -> Result<BackupRecord, BackupError> {
        context.current_context = "Compressing";
        let mut archive = archive::compress(
            &self.settings.backup_dir,
            Some(&mut LogProgress::new("Archived files")),
        )?;
        info!(
            "{context}Archived {} files into {} bytes",
            archive.files(),
            archive.len()
        );

        let (url, password) = match self.settings.password_length {
            Some(password_length) => {
                context.current_context = "Encrypting";
                let password = cipher::generate_password(password_length)?;
                let mut payload = EncryptedPayload::encrypt(&mut archive, &password)?;
                drop(archive);

                context.current_context = "Uploading";
                let len = payload.len();
                let url = self.store.upload(
                    &key,
                    &mut payload,
                    len,
                    Some(&mut LogProgress::new("Uploaded bytes")),
                )?;

                (url, Some(password))
            }

            None => {
                context.current_context = "Uploading";
                let len = archive.len();
                let url = self.store.upload(
                    &key,
                    &mut archive,
                    len,
                    Some(&mut LogProgress::new("Uploaded bytes")),
                )?;

                (url, None)
            }
        };

        Ok(BackupRecord {
            started,
            key,
            password,
            url,
        })
    }

    /// List the stored backups, download the selected one and extract it into the restore
    /// directory.
    pub fn run_restore(&mut self) -> Result<(), RestoreError> {
        let mut context = Context::new("Restore");

        context.current_context = "Listing";
        let prefix = format!("{}/", self.settings.prefix);
        let objects = self.store.list(&prefix)?;
        if objects.is_empty() {
            return Err(RestoreError::NoBackupsFound(prefix));
        }

        context.current_context = "AwaitingSelection";
        let keys: Vec<String> = objects.into_iter().map(|object| object.key).collect();
        let index = self.selector.choose_one(&keys)?;
        let key = keys.get(index).ok_or(RestoreError::InvalidSelection {
            index,
            count: keys.len(),
        })?;
        info!("{context}Selected '{key}'");

        context.current_context = "Downloading";
        let restore_dir = &self.settings.restore_dir;
        fs::create_dir_all(restore_dir)
            .map_err(io_failure("create restore directory", restore_dir))?;

        let file_name = key.rsplit('/').next().unwrap_or(key.as_str());
        let local_path = restore_dir.join(file_name);
        self.store.download(key, &local_path)?;
        info!("{context}Downloaded '{key}' to {local_path:?}");

        let downloaded = File::open(&local_path).map_err(io_failure("open download", &local_path))?;

        let entries = match &self.settings.restore_password {
            Some(password) => {
                context.current_context = "Decrypting";
                let plain = cipher::decrypt_to_spool(downloaded, password)?;

                context.current_context = "Extracting";
                archive::extract(
                    plain,
                    restore_dir,
                    Some(&mut LogProgress::new("Extracted entries")),
                )?
            }

            None => {
                context.current_context = "Extracting";
                archive::extract(
                    downloaded,
                    restore_dir,
                    Some(&mut LogProgress::new("Extracted entries")),
                )?
            }
        };

        info!("{context}Restored {entries} entries into {restore_dir:?}");
        Ok(())
    }
}

fn success_message(record: &BackupRecord) -> Zeroizing<String> {
    let mut message = format!(
        "### {SUCCESS_TITLE}\n\n- Time: {}\n- Archive: {}\n- Download: [link]({})\n",
        record.started.format("%Y-%m-%d %H:%M:%S"),
        record.key,
        record.url,
    );

    if let Some(password) = &record.password {
        message.push_str(&format!("- Password: `{}`\n", password.as_str()));
    }

    Zeroizing::new(message)
}

fn io_failure(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> RestoreError {
    let path = path.to_path_buf();
    move |source| RestoreError::Io {
        source,
        action,
        path,
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to archive the backup directory: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to encrypt the archive: {0}")]
    Cipher(#[from] CipherError),

    #[error("Failed to upload the archive: {0}")]
    Transfer(#[from] TransferError),

    #[error("Failed to notify the operator: {0}")]
    Notify(#[from] NotifyError),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("There are no backups under '{0}'")]
    NoBackupsFound(String),

    #[error("Selection {index} is not one of the {count} listed backups")]
    InvalidSelection { index: usize, count: usize },

    #[error("Failed to select a backup: {0}")]
    Select(#[from] SelectError),

    #[error("Failed to download the backup: {0}")]
    Transfer(#[from] TransferError),

    #[error("Failed to extract the backup: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to decrypt the backup: {0}")]
    Cipher(#[from] CipherError),

    #[error("Failed to {action} {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        action: &'static str,
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::output_key;

    #[test]
    fn key_is_minute_granular() {
        let started = Local.with_ymd_and_hms(2024, 5, 1, 9, 7, 59).unwrap();
        assert_eq!(
            output_key("backup", started),
            "backup/2024-05-01_09:07_bitwarden.zip"
        );
    }
}
