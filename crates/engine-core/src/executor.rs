//! Runs a planned statement list as one unit against the warehouse.
//!
//! Each attempt checks out exactly one connection and runs the statements on
//! it in order. A failing statement stops the attempt; the executor then
//! rolls back, releases the connection as unhealthy and runs the optional
//! compensating statement on a fresh connection. Serializable conflicts are
//! retried from scratch under the [`RetryPolicy`]; load rejections are
//! enriched with the warehouse's own diagnostic record.

use crate::{
    error::{LoadError, StatementFailure},
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use connectors::{
    error::WarehouseError,
    warehouse::{ConnectionSource, ReleaseDisposition, Row},
};
use planner::{
    plan::redact_credentials,
    query::{ast::transaction::TransactionControl, dialect::Redshift, to_sql},
};
use serde_json::Value;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// Most recent row of the warehouse's load error log.
pub const LOAD_ERRORS_QUERY: &str = "SELECT * FROM stl_load_errors ORDER BY starttime DESC LIMIT 1";

const LOAD_ERRORS_SIGNATURE: &str = "'stl_load_errors'";
const CONFLICT_SIGNATURE: &str = "serializable isolation violation on table";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The bulk load rejected source rows; details are in the load error log.
    LoadRejected,
    /// Two transactions contended; safe to retry.
    SerializableConflict,
    Other,
}

pub fn classify(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if lower.contains(LOAD_ERRORS_SIGNATURE) {
        FailureClass::LoadRejected
    } else if lower.contains(CONFLICT_SIGNATURE) {
        FailureClass::SerializableConflict
    } else {
        FailureClass::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReport {
    pub statements: usize,
    pub retries: usize,
    pub elapsed: Duration,
}

enum AttemptError {
    Connect(WarehouseError),
    Statement {
        failure: StatementFailure,
        class: FailureClass,
    },
}

#[derive(Clone)]
pub struct TransactionExecutor {
    source: Arc<dyn ConnectionSource>,
    policy: RetryPolicy,
}

impl TransactionExecutor {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            source,
            policy: RetryPolicy::for_serializable_conflicts(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(
        &self,
        statements: &[String],
        cleanup: Option<&str>,
    ) -> Result<TxReport, LoadError> {
        let started = Instant::now();

        let outcome = self
            .policy
            .run(
                |retries| self.attempt(statements, cleanup, retries),
                |err| match err {
                    AttemptError::Statement {
                        class: FailureClass::SerializableConflict,
                        ..
                    } => RetryDisposition::Retry,
                    _ => RetryDisposition::Stop,
                },
            )
            .await;

        match outcome {
            Ok(retries) => {
                let report = TxReport {
                    statements: statements.len(),
                    retries,
                    elapsed: started.elapsed(),
                };
                info!(
                    statements = report.statements,
                    retries,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Transaction committed"
                );
                Ok(report)
            }
            Err(RetryError::AttemptsExceeded(AttemptError::Statement { failure, .. })) => {
                error!(retries = failure.retries, "Serializable conflict retries exhausted");
                Err(LoadError::ConflictExhausted(failure))
            }
            Err(RetryError::Fatal(AttemptError::Statement {
                failure,
                class: FailureClass::LoadRejected,
            })) => {
                let details = self.load_error_details().await;
                Err(LoadError::CopyRejected { details, failure })
            }
            Err(RetryError::Fatal(AttemptError::Statement { failure, .. })) => {
                Err(LoadError::Transaction(failure))
            }
            Err(RetryError::Fatal(AttemptError::Connect(e)))
            | Err(RetryError::AttemptsExceeded(AttemptError::Connect(e))) => {
                Err(LoadError::Connection(e.to_string()))
            }
        }
    }

    /// One pass over the statement list. Returns the retry count on success
    /// so the caller can report it.
    async fn attempt(
        &self,
        statements: &[String],
        cleanup: Option<&str>,
        retries: usize,
    ) -> Result<usize, AttemptError> {
        let mut conn = self.source.acquire().await.map_err(AttemptError::Connect)?;

        for (step, sql) in statements.iter().enumerate() {
            debug!(step, retries, statement = %redact_credentials(sql), "Executing statement");

            if let Err(e) = conn.query(sql).await {
                let failure = StatementFailure::new(e.message(), sql, step, retries);
                let class = classify(&failure.message);
                warn!(
                    step,
                    retries,
                    class = ?class,
                    error = %failure.message,
                    "Statement failed, rolling back"
                );

                let rollback = to_sql(&TransactionControl::Rollback, &Redshift);
                if let Err(rb) = conn.query(&rollback).await {
                    warn!(error = %rb, "Rollback failed");
                }
                conn.release(ReleaseDisposition::Discard {
                    reason: failure.message.clone(),
                })
                .await;

                if let Some(cleanup) = cleanup {
                    self.run_cleanup(cleanup).await;
                }
                return Err(AttemptError::Statement { failure, class });
            }
        }

        conn.release(ReleaseDisposition::Reuse).await;
        Ok(retries)
    }

    /// Runs the compensating statement on its own connection. Failures are
    /// logged and swallowed so they never mask the primary error.
    async fn run_cleanup(&self, sql: &str) {
        let mut conn = match self.source.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Could not acquire a connection for cleanup");
                return;
            }
        };

        match conn.query(sql).await {
            Ok(_) => {
                debug!(statement = %sql, "Cleanup statement executed");
                conn.release(ReleaseDisposition::Reuse).await;
            }
            Err(e) => {
                warn!(statement = %sql, error = %e, "Cleanup statement failed");
                conn.release(ReleaseDisposition::Discard {
                    reason: e.message(),
                })
                .await;
            }
        }
    }

    /// Fetches the newest load error record. Never empty: when the record
    /// cannot be read, the reason is returned under `error`.
    async fn load_error_details(&self) -> Row {
        let fetched = async {
            let mut conn = self.source.acquire().await?;
            let result = conn.query(LOAD_ERRORS_QUERY).await;
            let disposition = match &result {
                Ok(_) => ReleaseDisposition::Reuse,
                Err(e) => ReleaseDisposition::Discard {
                    reason: e.message(),
                },
            };
            conn.release(disposition).await;
            result
        }
        .await;

        let reason = match fetched {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => return trim_values(row),
                None => "no load error record found".to_string(),
            },
            Err(e) => e.message(),
        };

        warn!(error = %reason, "Could not read load error details");
        let mut row = Row::new();
        row.insert("error".to_string(), Value::String(reason));
        row
    }
}

/// `CHAR` columns come back space padded.
fn trim_values(row: Row) -> Row {
    row.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, Value::String(s.trim().to_string())),
            other => (k, other),
        })
        .collect()
}
