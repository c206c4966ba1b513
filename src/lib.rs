//! Screen and microphone recorder daemon that saves to Google Drive or the
//! local disk.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod recording;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{RecorderSnapshot, RecordingController, SaveOutcome};
pub use error::{CaptureError, Result};
