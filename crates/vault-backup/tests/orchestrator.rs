//! Tests for the backup and restore flows
//!

use std::{fs, path::Path};

use chrono::{Local, TimeZone};
use common::{MemoryStore, RecordingNotifier};
use shared::test::{init_test_logger, read_tree, write_tree};
use vault_backup::{
    BackupError, Orchestrator, RestoreError, Settings,
    orchestrator::{FAILURE_MESSAGE, FAILURE_TITLE, SUCCESS_TITLE},
    select::{LatestSelector, SelectError},
};
use zeroize::Zeroizing;

mod common;

fn settings(root: &Path) -> Settings {
    Settings {
        backup_dir: root.join("vault"),
        restore_dir: root.join("restore"),
        prefix: "backup".to_string(),
        password_length: None,
        restore_password: None,
    }
}

fn never_select(_candidates: &[String]) -> Result<usize, SelectError> {
    panic!("the selector must not be consulted");
}

#[test]
fn backup_success() {
    let _logger = init_test_logger();
    let root = tempfile::tempdir().unwrap();
    write_tree(
        &root.path().join("vault"),
        &[("a.txt", "hello"), ("sub/b.txt", "world")],
    )
    .unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();
    let orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector);

    let started = Local.with_ymd_and_hms(2024, 5, 1, 10, 30, 12).unwrap();
    orchestrator.run_backup_at(started).unwrap();

    assert_eq!(store.uploads.get(), 1);
    assert_eq!(store.keys(), vec!["backup/2024-05-01_10:30_bitwarden.zip"]);

    let messages = notifier.messages.borrow();
    assert_eq!(messages.len(), 1);
    let (title, body) = &messages[0];
    assert_eq!(title, SUCCESS_TITLE);
    assert!(body.contains("https://bucket.example.com/backup/2024-05-01_10:30_bitwarden.zip"));
    assert!(body.contains("2024-05-01 10:30:12"));
    assert!(!body.contains("Password"));
}

#[test]
fn backup_now_uses_the_prefix() {
    let root = tempfile::tempdir().unwrap();
    write_tree(&root.path().join("vault"), &[("a.txt", "hello")]).unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();
    let orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector);

    orchestrator.run_backup().unwrap();

    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("backup/"));
    assert!(keys[0].ends_with("_bitwarden.zip"));
}

#[test]
fn backup_failure() {
    let _logger = init_test_logger();
    let root = tempfile::tempdir().unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();
    let orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector);

    let error = orchestrator.run_backup().unwrap_err();

    assert!(matches!(error, BackupError::Archive(ref archive) if archive.is_io_failure()));
    assert_eq!(store.uploads.get(), 0);
    assert_eq!(
        *notifier.messages.borrow(),
        vec![(FAILURE_TITLE.to_string(), FAILURE_MESSAGE.to_string())]
    );
}

#[test]
fn backup_failure_survives_failed_notification() {
    let root = tempfile::tempdir().unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::failing();
    let orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector);

    let error = orchestrator.run_backup().unwrap_err();

    assert!(matches!(error, BackupError::Archive(_)));
    assert_eq!(notifier.titles(), vec![FAILURE_TITLE]);
}

#[test]
fn failed_success_notification_is_reported() {
    let root = tempfile::tempdir().unwrap();
    write_tree(&root.path().join("vault"), &[("a.txt", "hello")]).unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::failing();
    let orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector);

    let error = orchestrator.run_backup().unwrap_err();

    assert!(matches!(error, BackupError::Notify(_)));
    assert_eq!(store.uploads.get(), 1);
    assert_eq!(notifier.titles(), vec![SUCCESS_TITLE]);
}

#[test]
fn bad_password_length_fails_before_upload() {
    let root = tempfile::tempdir().unwrap();
    write_tree(&root.path().join("vault"), &[("a.txt", "hello")]).unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();
    let mut settings = settings(root.path());
    settings.password_length = Some(20);
    let orchestrator = Orchestrator::new(settings, &store, &notifier, LatestSelector);

    let error = orchestrator.run_backup().unwrap_err();

    assert!(matches!(error, BackupError::Cipher(_)));
    assert_eq!(store.uploads.get(), 0);
    assert_eq!(notifier.titles(), vec![FAILURE_TITLE]);
}

#[test]
fn restore_with_no_backups() {
    let root = tempfile::tempdir().unwrap();

    let store = MemoryStore::default();
    store.insert("elsewhere/archive.zip", Vec::new(), 1);
    let notifier = RecordingNotifier::default();
    let mut orchestrator =
        Orchestrator::new(settings(root.path()), &store, &notifier, never_select);

    let error = orchestrator.run_restore().unwrap_err();

    assert!(matches!(error, RestoreError::NoBackupsFound(_)));
    assert_eq!(store.lists.get(), 1);
    assert_eq!(store.downloads.get(), 0);
    assert!(notifier.messages.borrow().is_empty());
}

#[test]
fn restore_selected_backup() {
    let _logger = init_test_logger();
    let root = tempfile::tempdir().unwrap();
    let vault = root.path().join("vault");
    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();

    write_tree(&vault, &[("old.txt", "old")]).unwrap();
    Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector)
        .run_backup_at(Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        .unwrap();

    fs::remove_dir_all(&vault).unwrap();
    write_tree(&vault, &[("a.txt", "hello"), ("sub/b.txt", "world"), ("empty/", "")]).unwrap();
    Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector)
        .run_backup_at(Local.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap())
        .unwrap();

    let mut offered = Vec::new();
    let select_newest = |candidates: &[String]| {
        offered = candidates.to_vec();
        Ok::<_, SelectError>(0)
    };
    let mut orchestrator = Orchestrator::new(settings(root.path()), &store, &notifier, select_newest);
    orchestrator.run_restore().unwrap();
    drop(orchestrator);

    assert_eq!(
        offered,
        vec![
            "backup/2024-05-02_10:00_bitwarden.zip",
            "backup/2024-05-01_10:00_bitwarden.zip"
        ]
    );

    let restore_dir = root.path().join("restore");
    assert!(restore_dir.join("2024-05-02_10:00_bitwarden.zip").is_file());
    assert_eq!(
        read_tree(&restore_dir.join("vault")).unwrap(),
        read_tree(&vault).unwrap()
    );
}

#[test]
fn restore_out_of_range_selection() {
    let root = tempfile::tempdir().unwrap();
    let store = MemoryStore::default();
    store.insert("backup/only.zip", Vec::new(), 1);
    let notifier = RecordingNotifier::default();

    let mut orchestrator = Orchestrator::new(
        settings(root.path()),
        &store,
        &notifier,
        |_: &[String]| Ok::<_, SelectError>(4),
    );
    let error = orchestrator.run_restore().unwrap_err();

    assert!(matches!(
        error,
        RestoreError::InvalidSelection { index: 4, count: 1 }
    ));
    assert_eq!(store.downloads.get(), 0);
}

#[test]
fn restore_cancelled() {
    let root = tempfile::tempdir().unwrap();
    let store = MemoryStore::default();
    store.insert("backup/only.zip", Vec::new(), 1);
    let notifier = RecordingNotifier::default();

    let mut orchestrator = Orchestrator::new(
        settings(root.path()),
        &store,
        &notifier,
        |_: &[String]| Err::<usize, _>(SelectError::UserCancelled),
    );
    let error = orchestrator.run_restore().unwrap_err();

    assert!(matches!(
        error,
        RestoreError::Select(SelectError::UserCancelled)
    ));
    assert_eq!(store.downloads.get(), 0);
}

#[test]
fn encrypted_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let vault = root.path().join("vault");
    write_tree(&vault, &[("a.txt", "hello"), ("sub/b.txt", "world")]).unwrap();

    let store = MemoryStore::default();
    let notifier = RecordingNotifier::default();
    let mut backup_settings = settings(root.path());
    backup_settings.password_length = Some(32);
    Orchestrator::new(backup_settings, &store, &notifier, LatestSelector)
        .run_backup()
        .unwrap();

    let password = {
        let messages = notifier.messages.borrow();
        let body = &messages[0].1;
        let start = body.find("Password: `").unwrap() + "Password: `".len();
        body[start..start + 32].to_string()
    };

    // Without the password the download is not a readable archive.
    let error = Orchestrator::new(settings(root.path()), &store, &notifier, LatestSelector)
        .run_restore()
        .unwrap_err();
    assert!(matches!(error, RestoreError::Archive(ref archive) if archive.is_corrupt()));

    let mut restore_settings = settings(root.path());
    restore_settings.restore_password = Some(Zeroizing::new(password));
    Orchestrator::new(restore_settings, &store, &notifier, LatestSelector)
        .run_restore()
        .unwrap();

    assert_eq!(
        read_tree(&root.path().join("restore/vault")).unwrap(),
        read_tree(&vault).unwrap()
    );
}
