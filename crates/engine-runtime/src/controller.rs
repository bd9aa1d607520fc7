//! Drives one load run: uploads, manifest, statement plan, transaction,
//! then the staged-object cleanup decided by the cleanup policy.

use crate::{
    keys::{KeyFactory, unique_suffix},
    lock,
    manifest::ManifestBuilder,
    payload::Payload,
    upload::UploadCoordinator,
};
use chrono::Utc;
use connectors::{store::ObjectStager, warehouse::ConnectionSource};
use engine_config::settings::LoaderSettings;
use engine_core::{
    error::LoadError,
    executor::{TransactionExecutor, TxReport},
    observer::{LoadObserver, NoopObserver},
};
use model::{
    core::identifiers::RunId,
    events::LoadEvent,
    load::{LoadMode, ManifestRef, RunState, TaskHandle},
};
use planner::plan::{LoadPlan, PlanRequest, plan, temp_table_name};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex},
    time::Instant,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of a committed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub mode: LoadMode,
    pub table: String,
    pub files: usize,
    pub manifest_key: String,
    pub statements: usize,
    pub retries: usize,
    pub duration_ms: u64,
}

pub struct Loader {
    run_id: RunId,
    settings: Arc<LoaderSettings>,
    stager: Arc<dyn ObjectStager>,
    executor: TransactionExecutor,
    observer: Arc<dyn LoadObserver>,
    keys: KeyFactory,
    uploads: UploadCoordinator,
    manifests: ManifestBuilder,
    state: Mutex<RunState>,
    manifest: Mutex<Option<ManifestRef>>,
    detached_cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl Loader {
    pub fn new(
        settings: Arc<LoaderSettings>,
        stager: Arc<dyn ObjectStager>,
        source: Arc<dyn ConnectionSource>,
    ) -> Self {
        Self::with_observer(settings, stager, source, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        settings: Arc<LoaderSettings>,
        stager: Arc<dyn ObjectStager>,
        source: Arc<dyn ConnectionSource>,
        observer: Arc<dyn LoadObserver>,
    ) -> Self {
        let run_id = RunId::generate();
        let keys = KeyFactory::new(settings.file_prefix.clone(), Utc::now());
        let executor = TransactionExecutor::new(source).with_policy(settings.retry.clone());
        let uploads = UploadCoordinator::new(
            run_id.clone(),
            settings.bucket.clone(),
            keys.clone(),
            stager.clone(),
            observer.clone(),
        );
        let manifests = ManifestBuilder::new(run_id.clone(), stager.clone(), observer.clone());

        info!(run_id = %run_id, table = %settings.table, "Loader created");

        Self {
            run_id,
            settings,
            stager,
            executor,
            observer,
            keys,
            uploads,
            manifests,
            state: Mutex::new(RunState::Created),
            manifest: Mutex::new(None),
            detached_cleanup: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.uploads.tasks()
    }

    /// Starts staging `payload`. Only allowed before the load starts.
    pub fn add_payload(&self, payload: impl Into<Payload>) -> Result<TaskHandle, LoadError> {
        if !self.state().accepts_uploads() {
            return Err(LoadError::AlreadyStarted);
        }
        self.uploads.register(payload.into())
    }

    pub async fn insert(&self) -> Result<RunSummary, LoadError> {
        self.run(LoadMode::Insert).await
    }

    pub async fn truncate_insert(&self) -> Result<RunSummary, LoadError> {
        self.run(LoadMode::TruncateInsert).await
    }

    pub async fn upsert(&self) -> Result<RunSummary, LoadError> {
        self.run(LoadMode::Upsert).await
    }

    /// Waits for uploads, stages the manifest and runs the load. A run can
    /// be started once.
    pub async fn run(&self, mode: LoadMode) -> Result<RunSummary, LoadError> {
        let started = Instant::now();
        self.begin()?;
        info!(run_id = %self.run_id, %mode, files = self.uploads.len(), "Load started");

        match self.execute(mode).await {
            Ok((report, files, manifest)) => {
                self.wrap_up(None).await;
                self.transition(RunState::Done);

                let summary = RunSummary {
                    run_id: self.run_id.clone(),
                    mode,
                    table: self.settings.table.qualified(),
                    files,
                    manifest_key: manifest.key,
                    statements: report.statements,
                    retries: report.retries,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    run_id = %self.run_id,
                    %mode,
                    files,
                    duration_ms = summary.duration_ms,
                    "Load finished"
                );
                self.observer.notify(&LoadEvent::Done {
                    run_id: self.run_id.clone(),
                    mode,
                    files,
                    duration_ms: summary.duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(summary)
            }
            Err(e) => {
                error!(run_id = %self.run_id, code = e.code(), error = %e, "Load failed");
                self.wrap_up(Some(&e)).await;
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Cancels outstanding uploads and deletes everything staged so far,
    /// whatever the cleanup policy says. Meant for callers whose own
    /// producer failed before the load could start.
    pub async fn abort(&self) {
        warn!(run_id = %self.run_id, state = %self.state(), "Aborting load");
        self.uploads.seal();
        self.uploads.cancel_incomplete();
        {
            let mut state = lock(&self.state);
            if !state.is_terminal() {
                *state = RunState::Failed;
            }
        }
        self.delete_staged().await;
    }

    /// Waits for a deletion started with `await_cleanup = false`.
    pub async fn join_cleanup(&self) {
        let handle = lock(&self.detached_cleanup).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(run_id = %self.run_id, error = %e, "Detached cleanup task failed");
            }
        }
    }

    /// Renders the statements `mode` would run, without touching the
    /// warehouse. `manifest` stands in for the staged manifest.
    pub fn plan_for(&self, mode: LoadMode, manifest: &ManifestRef) -> Result<LoadPlan, LoadError> {
        plan_load(&self.settings, mode, manifest, self.keys.stamp())
    }

    fn begin(&self) -> Result<(), LoadError> {
        let mut state = lock(&self.state);
        if !state.accepts_uploads() {
            return Err(LoadError::AlreadyStarted);
        }
        self.uploads.seal();

        if self.uploads.is_empty() {
            *state = RunState::Failed;
            drop(state);
            let err =
                LoadError::Validation("no payloads were added before starting the load".into());
            self.fail(&err);
            return Err(err);
        }

        *state = RunState::Uploading;
        Ok(())
    }

    async fn execute(
        &self,
        mode: LoadMode,
    ) -> Result<(TxReport, usize, ManifestRef), LoadError> {
        let tasks = self.uploads.await_all().await?;
        self.transition(RunState::Manifesting);

        let manifest = self
            .manifests
            .build(&tasks, &self.settings.bucket, &self.keys.manifest_key())
            .await?;
        *lock(&self.manifest) = Some(manifest.clone());
        self.transition(RunState::Loading);

        let plan = self.plan_for(mode, &manifest)?;
        debug!(
            run_id = %self.run_id,
            statements = plan.statements.len(),
            cleanup = plan.cleanup.is_some(),
            "Load planned"
        );

        let report = self
            .executor
            .run(&plan.statements, plan.cleanup.as_deref())
            .await?;
        Ok((report, tasks.len(), manifest))
    }

    /// The single gate for staged-object deletion on both outcomes.
    async fn wrap_up(&self, error: Option<&LoadError>) {
        self.uploads.cancel_incomplete();

        let succeeded = error.is_none();
        if !self.settings.cleanup.should_delete(succeeded) {
            debug!(
                run_id = %self.run_id,
                policy = ?self.settings.cleanup,
                succeeded,
                "Keeping staged objects"
            );
            return;
        }

        if self.settings.await_cleanup {
            self.delete_staged().await;
        } else {
            let keys = self.staged_keys();
            let (run_id, bucket) = (self.run_id.clone(), self.settings.bucket.clone());
            let (stager, observer) = (self.stager.clone(), self.observer.clone());
            let handle = tokio::spawn(async move {
                delete_objects(&run_id, &bucket, keys, stager.as_ref(), observer.as_ref()).await;
            });
            *lock(&self.detached_cleanup) = Some(handle);
        }
    }

    fn staged_keys(&self) -> Vec<String> {
        let mut keys = self.uploads.uploaded_keys();
        if let Some(manifest) = lock(&self.manifest).as_ref() {
            keys.push(manifest.key.clone());
        }
        keys
    }

    async fn delete_staged(&self) {
        delete_objects(
            &self.run_id,
            &self.settings.bucket,
            self.staged_keys(),
            self.stager.as_ref(),
            self.observer.as_ref(),
        )
        .await;
    }

    fn transition(&self, next: RunState) {
        let mut state = lock(&self.state);
        debug!(run_id = %self.run_id, from = %*state, to = %next, "Run state changed");
        *state = next;
    }

    fn fail(&self, err: &LoadError) {
        self.transition(RunState::Failed);
        self.observer.notify(&LoadEvent::Failed {
            run_id: self.run_id.clone(),
            error: err.to_string(),
            error_code: err.code().to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Plans a load for `settings`. The upsert temp table is named after the
/// temp-table base, `stamp` and a random suffix.
pub fn plan_load(
    settings: &LoaderSettings,
    mode: LoadMode,
    manifest: &ManifestRef,
    stamp: &str,
) -> Result<LoadPlan, LoadError> {
    let temp = (mode == LoadMode::Upsert)
        .then(|| temp_table_name(&settings.temp_table_base(), stamp, &unique_suffix()));

    Ok(plan(&PlanRequest {
        mode,
        target: &settings.table,
        temp_table: temp.as_ref(),
        manifest,
        credentials: &settings.credentials,
        copy: &settings.copy,
        id_column: &settings.id_column,
        drop_temp_after: settings.drop_temp_table,
        transactional_truncate: settings.transactional_truncate,
    })?)
}

/// Deletes `keys`, reporting the outcome as events. Never fails the run.
async fn delete_objects(
    run_id: &RunId,
    bucket: &str,
    keys: Vec<String>,
    stager: &dyn ObjectStager,
    observer: &dyn LoadObserver,
) {
    if keys.is_empty() {
        debug!(run_id = %run_id, "Nothing to delete");
        return;
    }

    match stager.delete_many(bucket, &keys).await {
        Ok(outcome) => {
            for (key, reason) in &outcome.errors {
                warn!(run_id = %run_id, key = %key, %reason, "Staged object not deleted");
            }
            info!(
                run_id = %run_id,
                deleted = outcome.deleted.len(),
                failed = outcome.errors.len(),
                "Staged objects deleted"
            );
            observer.notify(&LoadEvent::ObjectsDeleted {
                run_id: run_id.clone(),
                deleted: outcome.deleted.len(),
                failed: outcome.errors.len(),
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Deleting staged objects failed");
            observer.notify(&LoadEvent::DeleteFailed {
                run_id: run_id.clone(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::{env::EnvSnapshot, settings::LoaderSettingsBuilder};
    use model::{core::table::MAX_IDENTIFIER_LEN, load::CopyCredentials};

    fn settings(json: &str) -> LoaderSettings {
        LoaderSettingsBuilder::from_json_str(json)
            .unwrap()
            .credentials(CopyCredentials::Role {
                role: "arn:aws:iam::1:role/loader".into(),
            })
            .build(&EnvSnapshot::default())
            .unwrap()
    }

    fn manifest() -> ManifestRef {
        ManifestRef {
            bucket: "b".into(),
            key: "m.json".into(),
            entries: 1,
        }
    }

    #[test]
    fn test_plan_load_names_temp_table_from_loading_table() {
        let settings = settings(
            r#"{"table": "tests.rs_loader", "bucket": "b", "loading_table": {"schema": "loading"}}"#,
        );
        let plan = plan_load(&settings, LoadMode::Upsert, &manifest(), "20240101_000000").unwrap();

        assert_eq!(plan.statements.len(), 8);
        assert!(
            plan.statements[1]
                .starts_with(r#"DROP TABLE IF EXISTS "loading"."rs_loader_temp_20240101_000000_"#)
        );
        assert!(plan.statements[4].starts_with(r#"DELETE FROM "tests"."rs_loader" WHERE "id" IN"#));
    }

    #[test]
    fn test_plan_load_upsert_with_longest_table_name() {
        let table = "t".repeat(MAX_IDENTIFIER_LEN);
        let settings = settings(&format!(r#"{{"table": "tests.{table}", "bucket": "b"}}"#));
        let plan = plan_load(&settings, LoadMode::Upsert, &manifest(), "20240101_000000").unwrap();

        assert_eq!(plan.statements.len(), 8);
        assert!(plan.statements[1].contains("_temp_20240101_000000_"));
    }

    #[test]
    fn test_plan_load_insert_has_no_temp_table() {
        let settings = settings(r#"{"table": "tests.rs_loader", "bucket": "b"}"#);
        let plan = plan_load(&settings, LoadMode::Insert, &manifest(), "20240101_000000").unwrap();
        assert_eq!(plan.statements.len(), 1);
        assert!(plan.statements[0].contains("CREDENTIALS AS 'aws_iam_role=arn:aws:iam::1:role/loader'"));
    }
}
