//! # vault-backup
//! Archives a directory, optionally encrypts it, and keeps it in an S3 compatible bucket. Restores
//! reverse the pipeline into a local directory.
//!

pub mod archive;
pub mod cipher;
pub mod config;
pub mod context;
pub mod history;
pub mod notify;
pub mod orchestrator;
pub mod select;
pub mod store;

pub use orchestrator::{BackupError, Orchestrator, RestoreError, Settings};
