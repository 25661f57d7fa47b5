//! # common
//!

#![allow(dead_code)]

use core::cell::{Cell, RefCell};
use std::{
    collections::BTreeMap,
    fs,
    io::Read,
    path::Path,
};

use chrono::{DateTime, TimeZone, Utc};
use shared::Progress;
use vault_backup::{
    notify::{Notifier, NotifyError},
    store::{ObjectStore, RemoteObject, TransferError, newest_first},
};

/// An object store that keeps objects in memory and counts calls.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: RefCell<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    pub uploads: Cell<usize>,
    pub lists: Cell<usize>,
    pub downloads: Cell<usize>,
    clock: Cell<i64>,
}

impl MemoryStore {
    /// Insert an object modified at `seconds` past the epoch.
    pub fn insert(&self, key: &str, contents: Vec<u8>, seconds: i64) {
        let modified = Utc.timestamp_opt(seconds, 0).unwrap();
        self.objects
            .borrow_mut()
            .insert(key.to_string(), (contents, modified));
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.borrow().keys().cloned().collect()
    }
}

impl ObjectStore for MemoryStore {
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        len: u64,
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<String, TransferError> {
        self.uploads.set(self.uploads.get() + 1);

        let mut contents = Vec::new();
        body.read_to_end(&mut contents)
            .map_err(TransferError::ReadBody)?;
        assert_eq!(u64::try_from(contents.len()).unwrap(), len);

        if let Some(progress) = progress.as_deref_mut() {
            progress.update(len, len);
        }

        self.clock.set(self.clock.get() + 1);
        self.insert(key, contents, 1_700_000_000 + self.clock.get());

        Ok(format!("https://bucket.example.com/{key}?X-Amz-Expires=3600"))
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError> {
        self.lists.set(self.lists.get() + 1);

        let objects = self
            .objects
            .borrow()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (contents, modified))| RemoteObject {
                key: key.clone(),
                last_modified: *modified,
                size: u64::try_from(contents.len()).unwrap(),
            })
            .collect();

        Ok(newest_first(objects))
    }

    fn download(&self, key: &str, local_path: &Path) -> Result<(), TransferError> {
        self.downloads.set(self.downloads.get() + 1);

        let contents = match self.objects.borrow().get(key) {
            Some((contents, _)) => contents.clone(),
            None => {
                return Err(TransferError::Request {
                    action: "download",
                    key: key.to_string(),
                    message: "NoSuchKey".to_string(),
                });
            }
        };

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(local_path, contents).unwrap();

        Ok(())
    }
}

/// A notifier that records every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: RefCell<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            messages: RefCell::default(),
            fail: true,
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send_message(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        self.messages
            .borrow_mut()
            .push((title.to_string(), body.to_string()));

        if self.fail {
            return Err(NotifyError::Rejected {
                code: 310000,
                message: "keywords not in content".to_string(),
            });
        }

        Ok(())
    }
}
