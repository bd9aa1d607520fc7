use thiserror::Error;

/// Errors raised by an object stager.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transfer was aborted before it completed.
    #[error("Transfer cancelled")]
    Cancelled,

    /// Reading the payload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object store rejected a request.
    #[error("S3 {op} failed for '{key}': {message}")]
    S3 {
        op: &'static str,
        key: String,
        message: String,
    },

    /// Any other stager-specific failure.
    #[error("Object store error: {0}")]
    Other(String),
}

/// Errors raised by the warehouse connection layer.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("{0}")]
    Query(String),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("{}", postgres_message(.0))]
    Postgres(#[from] tokio_postgres::Error),
}

impl WarehouseError {
    /// The server's own message, without driver decoration, so callers can
    /// match on it.
    pub fn message(&self) -> String {
        match self {
            WarehouseError::Query(msg) => msg.clone(),
            WarehouseError::Postgres(e) => postgres_message(e),
            other => other.to_string(),
        }
    }
}

fn postgres_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{}\n{detail}", db.message()),
            None => db.message().to_string(),
        },
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_message_passthrough() {
        let err = WarehouseError::Query("Load into table 'x' failed".into());
        assert_eq!(err.message(), "Load into table 'x' failed");
        assert_eq!(err.to_string(), "Load into table 'x' failed");
    }
}
