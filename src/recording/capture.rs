use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const WEBM_MIME_TYPE: &str = "video/webm";

/// What the capture source is asked to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub screen: bool,
    pub microphone: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            screen: true,
            microphone: true,
        }
    }
}

/// Finalized encoded media produced by one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub data: Bytes,
    pub mime_type: String,
}

impl Artifact {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn webm(data: impl Into<Bytes>) -> Self {
        Self::new(data, WEBM_MIME_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the negotiated media type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.split(';').next().map(str::trim) {
            Some("video/mp4") => "mp4",
            Some("video/x-matroska") => "mkv",
            _ => "webm",
        }
    }
}

/// Platform capture + encode primitive.
///
/// `open` prompts for device access once; `finish` drains the encoder and
/// returns the whole artifact. `release` must be safe to call in any state.
pub trait CaptureSource: Send {
    fn open(&mut self, request: CaptureRequest) -> BoxFuture<'_, Result<()>>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    fn finish(&mut self) -> BoxFuture<'_, Result<Artifact>>;

    fn release(&mut self);
}
