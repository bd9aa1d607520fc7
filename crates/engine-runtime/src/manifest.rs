use chrono::Utc;
use connectors::{error::StoreError, store::ObjectStager};
use engine_core::{error::LoadError, observer::LoadObserver};
use model::{
    core::identifiers::RunId,
    events::LoadEvent,
    load::{Manifest, ManifestRef, TaskHandle},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Writes the manifest document that lists every staged payload.
pub struct ManifestBuilder {
    run_id: RunId,
    stager: Arc<dyn ObjectStager>,
    observer: Arc<dyn LoadObserver>,
}

impl ManifestBuilder {
    pub fn new(
        run_id: RunId,
        stager: Arc<dyn ObjectStager>,
        observer: Arc<dyn LoadObserver>,
    ) -> Self {
        Self {
            run_id,
            stager,
            observer,
        }
    }

    /// Stages the manifest for `tasks` under `key`.
    ///
    /// # Panics
    ///
    /// If any task is not uploaded.
    pub async fn build(
        &self,
        tasks: &[TaskHandle],
        bucket: &str,
        key: &str,
    ) -> Result<ManifestRef, LoadError> {
        assert!(
            tasks.iter().all(TaskHandle::is_uploaded),
            "manifest built before every upload completed"
        );

        let manifest = Manifest::for_keys(bucket, tasks.iter().map(|t| t.key.as_str()));
        let staged = match serde_json::to_string_pretty(&manifest) {
            Ok(document) => self.stager.put(bucket, key, document.into()).await,
            Err(e) => Err(StoreError::Other(e.to_string())),
        };

        match staged {
            Ok(_) => {
                info!(run_id = %self.run_id, key, entries = manifest.len(), "Manifest staged");
                self.observer.notify(&LoadEvent::ManifestUploaded {
                    run_id: self.run_id.clone(),
                    key: key.to_string(),
                    entries: manifest.len(),
                    timestamp: Utc::now(),
                });
                Ok(ManifestRef {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    entries: manifest.len(),
                })
            }
            Err(e) => {
                warn!(run_id = %self.run_id, key, error = %e, "Manifest staging failed");
                self.observer.notify(&LoadEvent::ManifestUploadFailed {
                    run_id: self.run_id.clone(),
                    key: key.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(LoadError::ManifestUpload {
                    key: key.to_string(),
                    source: Arc::new(e),
                })
            }
        }
    }
}
