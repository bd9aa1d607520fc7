use connectors::{error::StoreError, warehouse::Row};
use planner::plan::{PlanError, redact_credentials};
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Stable classification of a [`LoadError`], exposed to callers as a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Validation,
    AlreadyStarted,
    Upload,
    ManifestUpload,
    Connection,
    Transaction,
    CopyRejected,
    ConflictExhausted,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::AlreadyStarted => "RS_LOAD_STARTED",
            ErrorKind::Upload => "UPLOAD_FAILED",
            ErrorKind::ManifestUpload => "MANIFEST_UPLOAD_FAILED",
            ErrorKind::Connection => "CONNECTION_FAILED",
            ErrorKind::Transaction => "TRANSACTION_ERROR",
            ErrorKind::CopyRejected => "RS_COPY_ERROR",
            ErrorKind::ConflictExhausted => "TRANSIENT_CONFLICT_EXHAUSTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A statement that failed, with enough context to diagnose it without
/// re-running the load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementFailure {
    /// The warehouse's message.
    pub message: String,
    /// The failing statement with its credentials clause masked.
    pub statement: String,
    /// Zero-based position of the statement in the plan.
    pub step: usize,
    /// Conflict retries consumed before this attempt.
    pub retries: usize,
}

impl StatementFailure {
    pub fn new(message: impl Into<String>, statement: &str, step: usize, retries: usize) -> Self {
        Self {
            message: message.into(),
            statement: redact_credentials(statement),
            step,
            retries,
        }
    }
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (statement #{}, retries: {})\n{}",
            self.message, self.step, self.retries, self.statement
        )
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid load configuration: {0}")]
    Validation(String),

    #[error("Load already started, no more payloads can be added")]
    AlreadyStarted,

    #[error("Upload of '{key}' failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: Arc<StoreError>,
    },

    #[error("Manifest upload to '{key}' failed: {source}")]
    ManifestUpload {
        key: String,
        #[source]
        source: Arc<StoreError>,
    },

    #[error("Could not acquire a warehouse connection: {0}")]
    Connection(String),

    #[error("Transaction failed: {0}")]
    Transaction(StatementFailure),

    /// The bulk load rejected rows; `details` is the warehouse's most
    /// recent load-error record.
    #[error("Load rejected by the warehouse: {failure}")]
    CopyRejected {
        details: Row,
        failure: StatementFailure,
    },

    #[error("Serializable conflict persisted after retries: {0}")]
    ConflictExhausted(StatementFailure),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Validation(_) | LoadError::Plan(_) => ErrorKind::Validation,
            LoadError::AlreadyStarted => ErrorKind::AlreadyStarted,
            LoadError::Upload { .. } => ErrorKind::Upload,
            LoadError::ManifestUpload { .. } => ErrorKind::ManifestUpload,
            LoadError::Connection(_) => ErrorKind::Connection,
            LoadError::Transaction(_) => ErrorKind::Transaction,
            LoadError::CopyRejected { .. } => ErrorKind::CopyRejected,
            LoadError::ConflictExhausted(_) => ErrorKind::ConflictExhausted,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// The statement context, for errors raised by the executor.
    pub fn failure(&self) -> Option<&StatementFailure> {
        match self {
            LoadError::Transaction(failure)
            | LoadError::ConflictExhausted(failure)
            | LoadError::CopyRejected { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
