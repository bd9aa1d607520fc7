#![allow(dead_code)]

use crate::utils::{MemoryStager, ScriptedWarehouse};
use engine_config::{env::EnvSnapshot, settings::LoaderSettingsBuilder};
use engine_core::{
    observer::{ChannelObserver, LoadObserver},
    retry::RetryPolicy,
};
use engine_runtime::controller::Loader;
use model::{
    core::table::TableName,
    events::LoadEvent,
    load::{CleanupPolicy, CopyCredentials, TaskHandle},
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;

pub mod integration;
pub mod utils;

pub const TEST_BUCKET: &str = "rs-loader-tests";
pub const TEST_ROLE: &str = "arn:aws:iam::123456789012:role/rs-loader";

pub fn table() -> TableName {
    TableName::new(Some("tests"), "rs_loader")
}

/// Settings every scenario starts from: role credentials, a per-table
/// prefix and the default cleanup policy.
pub fn base_settings() -> LoaderSettingsBuilder {
    LoaderSettingsBuilder::new()
        .table(table())
        .bucket(TEST_BUCKET)
        .file_prefix("redload/{schema}/{table}/")
        .credentials(CopyCredentials::Role {
            role: TEST_ROLE.into(),
        })
}

pub fn with_cleanup(policy: CleanupPolicy) -> LoaderSettingsBuilder {
    base_settings().cleanup(policy)
}

/// A loader over in-memory doubles.
pub fn loader(
    settings: LoaderSettingsBuilder,
    stager: &Arc<MemoryStager>,
    warehouse: &Arc<ScriptedWarehouse>,
) -> Loader {
    loader_with_observer(settings, stager, warehouse, Arc::new(|_: &LoadEvent| {}))
}

pub fn loader_with_observer(
    settings: LoaderSettingsBuilder,
    stager: &Arc<MemoryStager>,
    warehouse: &Arc<ScriptedWarehouse>,
    observer: Arc<dyn LoadObserver>,
) -> Loader {
    let settings = settings
        .build(&EnvSnapshot::default())
        .expect("test settings are valid");
    Loader::with_observer(
        Arc::new(settings),
        stager.clone(),
        warehouse.source(),
        observer,
    )
}

/// An observer that keeps every event it sees.
pub fn recorder() -> (Arc<dyn LoadObserver>, Arc<Mutex<Vec<LoadEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer: Arc<dyn LoadObserver> =
        Arc::new(move |event: &LoadEvent| sink.lock().unwrap().push(event.clone()));
    (observer, events)
}

pub fn channel_observer(capacity: usize) -> (Arc<dyn LoadObserver>, mpsc::Receiver<LoadEvent>) {
    let (observer, rx) = ChannelObserver::channel(capacity);
    (Arc::new(observer), rx)
}

pub fn event_types(events: &Mutex<Vec<LoadEvent>>) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(LoadEvent::event_type).collect()
}

pub fn serializable_conflict() -> &'static str {
    "ERROR: 1023 DETAIL: Serializable isolation violation on table - 100123, transactions forming the cycle are: 4410, 4411"
}

pub fn copy_rejected() -> &'static str {
    "Load into table 'rs_loader' failed. Check 'stl_load_errors' system table for details."
}

pub fn default_backoff() -> RetryPolicy {
    RetryPolicy::for_serializable_conflicts()
}

/// Polls `check` until it holds, giving spawned tasks time to settle.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub async fn wait_until_uploaded(loader: &Loader, index: usize) {
    eventually(|| {
        loader
            .tasks()
            .get(index)
            .is_some_and(TaskHandle::is_uploaded)
    })
    .await;
}
