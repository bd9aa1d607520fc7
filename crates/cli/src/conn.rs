use crate::error::CliError;
use connectors::warehouse::{ConnectionSource, ReleaseDisposition, postgres::PgConnectionSource};
use serde_json::Value;
use tracing::{error, info};

/// Acquires a connection and checks that `SELECT 1` answers `1`.
pub async fn ping(url: &str) -> Result<(), CliError> {
    let source = PgConnectionSource::new(url)?;
    info!("Pinging warehouse");

    let mut conn = source.acquire().await.map_err(|e| {
        error!(error = %e, "Warehouse connection failed");
        e
    })?;

    let rows = match conn.query("SELECT 1").await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "Ping query failed");
            conn.release(ReleaseDisposition::Discard {
                reason: e.message(),
            })
            .await;
            return Err(e.into());
        }
    };
    conn.release(ReleaseDisposition::Reuse).await;

    let answer = rows.first().and_then(|row| row.values().next()).cloned();
    match answer {
        Some(Value::String(v)) if v == "1" => {
            info!("Warehouse ping succeeded");
            Ok(())
        }
        other => {
            let msg = format!("Ping returned unexpected result: {other:?}");
            error!("{msg}");
            Err(CliError::Unexpected(msg))
        }
    }
}
