use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `yyyyMMdd_HHmmss` in UTC.
pub fn job_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Random suffix that keeps keys and temp tables from colliding across
/// concurrent runs.
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generates object keys for one run. All keys share the run's timestamp.
#[derive(Debug, Clone)]
pub struct KeyFactory {
    prefix: String,
    stamp: String,
}

impl KeyFactory {
    pub fn new(prefix: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.into(),
            stamp: job_stamp(at),
        }
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn payload_key(&self, index: usize) -> String {
        format!(
            "{}{}_prt_{index}_{}.txt",
            self.prefix,
            self.stamp,
            unique_suffix()
        )
    }

    pub fn manifest_key(&self) -> String {
        format!(
            "{}_{}_manifest_{}.json",
            self.prefix,
            self.stamp,
            unique_suffix()
        )
    }
}
