mod capture;
mod pipeline;
mod session;
mod state;
mod timer;

pub use capture::{Artifact, CaptureRequest, CaptureSource, WEBM_MIME_TYPE};
pub use pipeline::{CaptureSettings, ScreenCapture};
pub use session::{CaptureSession, SessionObserver};
pub use state::{Command, RecordingStatus};
pub use timer::Timer;
