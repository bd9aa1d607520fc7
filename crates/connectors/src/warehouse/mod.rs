//! Warehouse connection seam. The executor only ever sees
//! [`ConnectionSource`]; pools and plain connect functions are adapted to it
//! at the edge.

use crate::error::WarehouseError;
use async_trait::async_trait;
use std::{future::Future, marker::PhantomData};

pub mod postgres;

/// One result row, column name to value. Values arrive as text over the
/// simple query protocol; SQL `NULL` becomes `Value::Null`.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// How a connection is handed back to its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseDisposition {
    /// The connection is healthy and may be reused.
    Reuse,
    /// The connection saw a failure; sources that pool should evict it.
    Discard { reason: String },
}

#[async_trait]
pub trait WarehouseConnection: Send {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, WarehouseError>;

    async fn release(self: Box<Self>, disposition: ReleaseDisposition);
}

#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError>;
}

/// Adapts a bare `Fn() -> Future<Output = connection>` to [`ConnectionSource`].
pub struct FnSource<F, Fut> {
    connect: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnSource<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Box<dyn WarehouseConnection>, WarehouseError>> + Send,
{
    pub fn new(connect: F) -> Self {
        Self {
            connect,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> ConnectionSource for FnSource<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Box<dyn WarehouseConnection>, WarehouseError>> + Send,
{
    async fn acquire(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        (self.connect)().await
    }
}
