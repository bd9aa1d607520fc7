use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one staged payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    Pending,
    InFlight,
    Uploaded,
    Failed,
}

impl UploadState {
    pub fn is_settled(&self) -> bool {
        matches!(self, UploadState::Uploaded | UploadState::Failed)
    }
}

/// Point-in-time view of an upload task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub index: usize,
    pub key: String,
    pub state: UploadState,
    pub error: Option<String>,
}

impl TaskHandle {
    pub fn is_uploaded(&self) -> bool {
        self.state == UploadState::Uploaded
    }
}

/// Overall state of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Created,
    Uploading,
    Manifesting,
    Loading,
    Done,
    Failed,
}

impl RunState {
    pub fn accepts_uploads(&self) -> bool {
        matches!(self, RunState::Created)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Created => "CREATED",
            RunState::Uploading => "UPLOADING",
            RunState::Manifesting => "MANIFESTING",
            RunState::Loading => "LOADING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
