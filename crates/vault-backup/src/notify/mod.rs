//! Operator notifications.
//!

mod ding_talk;

pub use ding_talk::{DingTalk, DingTalkConfig, compute_sign};

use thiserror::Error;

/// Something that can deliver a titled message to an operator.
pub trait Notifier {
    /// Send a single message, no retries are attempted.
    fn send_message(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send_message(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        (**self).send_message(title, body)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to {1}: {0}")]
    Http(#[source] reqwest::Error, &'static str),

    #[error("The webhook rejected the message with code {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("Failed to sign the webhook request: {0}")]
    Signing(#[source] hmac::digest::InvalidLength),
}
