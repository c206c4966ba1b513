use serde::{Deserialize, Serialize};

/// Lifecycle of a single capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl Default for RecordingStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Commands accepted by the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl RecordingStatus {
    /// Transition table. `None` means the command is ignored in this state.
    pub fn apply(self, command: Command) -> Option<RecordingStatus> {
        use Command::*;
        use RecordingStatus::*;

        match (self, command) {
            (Idle, Start) => Some(Recording),
            (Recording, Pause) => Some(Paused),
            (Paused, Resume) => Some(Recording),
            (Recording | Paused, Stop) => Some(Stopped),
            (Stopped | Idle, Reset) => Some(Idle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::Idle => "idle",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Paused => "paused",
            RecordingStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
