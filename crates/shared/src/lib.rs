//! # Shared
//! The ambient pieces shared by the backup pipeline and its binary.
//!

#![warn(missing_docs)]

mod cadence;
mod failure;
mod logger;
mod progress;

pub use cadence::Cadence;
pub use failure::Failure;
pub use logger::{LoggerError, init_logger};
pub use progress::{LogProgress, NoProgress, Progress};
