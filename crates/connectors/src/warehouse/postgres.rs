use crate::{
    error::WarehouseError,
    warehouse::{ConnectionSource, ReleaseDisposition, Row, WarehouseConnection},
};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, config::SslMode};
use tracing::{debug, error, warn};

/// Connection source speaking the Postgres wire protocol, which Redshift
/// accepts. Healthy connections are kept for reuse, up to `max_idle`.
#[derive(Clone)]
pub struct PgConnectionSource {
    config: Config,
    idle: Arc<Mutex<Vec<Client>>>,
    max_idle: usize,
}

impl PgConnectionSource {
    pub fn new(url: &str) -> Result<Self, WarehouseError> {
        let config = url
            .parse::<Config>()
            .map_err(|e| WarehouseError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            config,
            idle: Arc::new(Mutex::new(Vec::new())),
            max_idle: 4,
        })
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

#[async_trait]
impl ConnectionSource for PgConnectionSource {
    async fn acquire(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        let reused = {
            let mut idle = self.idle.lock().await;
            let mut found = None;
            while let Some(client) = idle.pop() {
                if !client.is_closed() {
                    found = Some(client);
                    break;
                }
            }
            found
        };

        let client = match reused {
            Some(client) => client,
            None => connect_client(self.config.clone()).await?,
        };

        Ok(Box::new(PgConnection {
            client,
            idle: self.idle.clone(),
            max_idle: self.max_idle,
        }))
    }
}

pub struct PgConnection {
    client: Client,
    idle: Arc<Mutex<Vec<Client>>>,
    max_idle: usize,
}

#[async_trait]
impl WarehouseConnection for PgConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        let messages = self.client.simple_query(sql).await?;
        let rows = messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = row
                            .get(i)
                            .map_or(Value::Null, |v| Value::String(v.to_string()));
                        (column.name().to_string(), value)
                    })
                    .collect::<Row>()
            })
            .collect();
        Ok(rows)
    }

    async fn release(self: Box<Self>, disposition: ReleaseDisposition) {
        let PgConnection {
            client,
            idle,
            max_idle,
        } = *self;

        match disposition {
            ReleaseDisposition::Reuse if !client.is_closed() => {
                let mut idle = idle.lock().await;
                if idle.len() < max_idle {
                    idle.push(client);
                }
            }
            ReleaseDisposition::Reuse => {}
            ReleaseDisposition::Discard { reason } => {
                debug!(%reason, "Discarding warehouse connection");
            }
        }
    }
}

pub(crate) async fn connect_client(config: Config) -> Result<Client, WarehouseError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Warehouse TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

async fn connect_with_tls(config: Config) -> Result<Client, WarehouseError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| WarehouseError::Connect(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Warehouse connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, WarehouseError> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| WarehouseError::Connect(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Warehouse connection error");
        }
    });
    Ok(client)
}
