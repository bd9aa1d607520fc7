use crate::{core::identifiers::RunId, load::LoadMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four advisory progress channels a run reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    UploadedFile,
    UploadedManifest,
    DeleteObjects,
    Terminal,
}

/// Lifecycle notifications emitted during a load run. These are
/// observability only; nothing in the run waits on their delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadEvent {
    /// A payload finished staging.
    FileUploaded {
        run_id: RunId,
        index: usize,
        key: String,
        bytes: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A payload failed to stage, or was cancelled.
    FileUploadFailed {
        run_id: RunId,
        index: usize,
        key: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    ManifestUploaded {
        run_id: RunId,
        key: String,
        entries: usize,
        timestamp: DateTime<Utc>,
    },

    ManifestUploadFailed {
        run_id: RunId,
        key: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Staged objects were removed from the store.
    ObjectsDeleted {
        run_id: RunId,
        deleted: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    DeleteFailed {
        run_id: RunId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The load committed.
    Done {
        run_id: RunId,
        mode: LoadMode,
        files: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The load failed permanently.
    Failed {
        run_id: RunId,
        error: String,
        error_code: String,
        timestamp: DateTime<Utc>,
    },
}

impl LoadEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LoadEvent::FileUploaded { .. } => "upload.completed",
            LoadEvent::FileUploadFailed { .. } => "upload.failed",
            LoadEvent::ManifestUploaded { .. } => "manifest.completed",
            LoadEvent::ManifestUploadFailed { .. } => "manifest.failed",
            LoadEvent::ObjectsDeleted { .. } => "cleanup.completed",
            LoadEvent::DeleteFailed { .. } => "cleanup.failed",
            LoadEvent::Done { .. } => "load.done",
            LoadEvent::Failed { .. } => "load.failed",
        }
    }

    pub fn progress(&self) -> Progress {
        match self {
            LoadEvent::FileUploaded { .. } | LoadEvent::FileUploadFailed { .. } => {
                Progress::UploadedFile
            }
            LoadEvent::ManifestUploaded { .. } | LoadEvent::ManifestUploadFailed { .. } => {
                Progress::UploadedManifest
            }
            LoadEvent::ObjectsDeleted { .. } | LoadEvent::DeleteFailed { .. } => {
                Progress::DeleteObjects
            }
            LoadEvent::Done { .. } | LoadEvent::Failed { .. } => Progress::Terminal,
        }
    }

    pub fn run_id(&self) -> &RunId {
        match self {
            LoadEvent::FileUploaded { run_id, .. }
            | LoadEvent::FileUploadFailed { run_id, .. }
            | LoadEvent::ManifestUploaded { run_id, .. }
            | LoadEvent::ManifestUploadFailed { run_id, .. }
            | LoadEvent::ObjectsDeleted { run_id, .. }
            | LoadEvent::DeleteFailed { run_id, .. }
            | LoadEvent::Done { run_id, .. }
            | LoadEvent::Failed { run_id, .. } => run_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            LoadEvent::FileUploadFailed { .. }
                | LoadEvent::ManifestUploadFailed { .. }
                | LoadEvent::DeleteFailed { .. }
                | LoadEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LoadEvent::ManifestUploaded {
            run_id: RunId::new("run-1"),
            key: "prefix_manifest.json".into(),
            entries: 2,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "manifest_uploaded");
        assert_eq!(json["entries"], 2);
        assert_eq!(event.progress(), Progress::UploadedManifest);
        assert!(!event.is_error());
    }
}
