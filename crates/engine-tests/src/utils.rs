#![allow(dead_code)]

//! In-memory stand-ins for the object store and the warehouse.

use async_trait::async_trait;
use bytes::Bytes;
use connectors::{
    error::{StoreError, WarehouseError},
    store::{DeleteOutcome, ObjectStager, StageBody, StageReceipt},
    warehouse::{ConnectionSource, FnSource, ReleaseDisposition, Row, WarehouseConnection},
};
use engine_core::executor::LOAD_ERRORS_QUERY;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::time::Instant;

/// Object store kept in memory. Keys matching a failure pattern fail,
/// keys matching a hang pattern block until the transfer is dropped.
#[derive(Default)]
pub struct MemoryStager {
    objects: Mutex<BTreeMap<String, Bytes>>,
    puts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
    fail_patterns: Mutex<Vec<String>>,
    hang_patterns: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
}

/// Records the key when a hung transfer is dropped.
struct DropRecorder {
    key: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Drop for DropRecorder {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(self.key.clone());
    }
}

impl MemoryStager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, pattern: &str) {
        self.fail_patterns.lock().unwrap().push(pattern.to_string());
    }

    pub fn hang_on(&self, pattern: &str) {
        self.hang_patterns.lock().unwrap().push(pattern.to_string());
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Every key a put was attempted for, in call order.
    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn object(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn manifest_key(&self) -> Option<String> {
        self.put_keys().into_iter().find(|k| k.contains("_manifest_"))
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn matches(patterns: &Mutex<Vec<String>>, key: &str) -> bool {
        patterns.lock().unwrap().iter().any(|p| key.contains(p.as_str()))
    }
}

#[async_trait]
impl ObjectStager for MemoryStager {
    async fn put(
        &self,
        _bucket: &str,
        key: &str,
        body: StageBody,
    ) -> Result<StageReceipt, StoreError> {
        self.puts.lock().unwrap().push(key.to_string());

        if Self::matches(&self.fail_patterns, key) {
            return Err(StoreError::Other(format!("injected failure for {key}")));
        }
        if Self::matches(&self.hang_patterns, key) {
            let _recorder = DropRecorder {
                key: key.to_string(),
                log: self.cancelled.clone(),
            };
            futures::future::pending::<()>().await;
        }

        let bytes = body.collect().await?;
        let size = bytes.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(StageReceipt {
            key: key.to_string(),
            bytes: size,
            etag: None,
        })
    }

    async fn delete_many(
        &self,
        _bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StoreError> {
        self.deletes.lock().unwrap().push(keys.to_vec());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("delete denied".into()));
        }

        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(DeleteOutcome {
            deleted: keys.to_vec(),
            errors: Vec::new(),
        })
    }
}

/// One statement as seen by the warehouse.
#[derive(Debug, Clone)]
pub struct Executed {
    pub connection: usize,
    pub sql: String,
    pub at: Instant,
}

/// Warehouse double. Statements succeed unless a queued failure matches
/// their prefix; each queued failure fires once.
#[derive(Default)]
pub struct ScriptedWarehouse {
    log: Mutex<Vec<Executed>>,
    failures: Mutex<VecDeque<(String, String)>>,
    diagnostics: Mutex<Option<Row>>,
    connections: AtomicUsize,
    discards: AtomicUsize,
}

impl ScriptedWarehouse {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_once(&self, prefix: &str, message: &str) {
        self.fail_times(prefix, message, 1);
    }

    pub fn fail_times(&self, prefix: &str, message: &str, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back((prefix.to_string(), message.to_string()));
        }
    }

    pub fn set_diagnostics(&self, row: Row) {
        *self.diagnostics.lock().unwrap() = Some(row);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.log.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    /// Statements run on one connection, in order.
    pub fn on_connection(&self, connection: usize) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|e| e.connection == connection)
            .map(|e| e.sql)
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    fn connect(self: &Arc<Self>) -> ScriptedConnection {
        let id = self.connections.fetch_add(1, Ordering::SeqCst);
        ScriptedConnection {
            id,
            warehouse: self.clone(),
        }
    }

    /// A connection source backed by this warehouse.
    pub fn source(self: &Arc<Self>) -> Arc<dyn ConnectionSource> {
        let warehouse = self.clone();
        Arc::new(FnSource::new(move || {
            let conn = warehouse.connect();
            async move { Ok(Box::new(conn) as Box<dyn WarehouseConnection>) }
        }))
    }
}

pub struct ScriptedConnection {
    id: usize,
    warehouse: Arc<ScriptedWarehouse>,
}

#[async_trait]
impl WarehouseConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        self.warehouse.log.lock().unwrap().push(Executed {
            connection: self.id,
            sql: sql.to_string(),
            at: Instant::now(),
        });

        if sql == LOAD_ERRORS_QUERY {
            let row = self.warehouse.diagnostics.lock().unwrap().clone();
            return Ok(row.into_iter().collect());
        }

        let mut failures = self.warehouse.failures.lock().unwrap();
        if let Some(pos) = failures
            .iter()
            .position(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            let (_, message) = failures.remove(pos).unwrap();
            return Err(WarehouseError::Query(message));
        }
        Ok(Vec::new())
    }

    async fn release(self: Box<Self>, disposition: ReleaseDisposition) {
        if let ReleaseDisposition::Discard { .. } = disposition {
            self.warehouse.discards.fetch_add(1, Ordering::SeqCst);
        }
    }
}
