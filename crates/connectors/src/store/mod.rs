//! Object stager seam: where payload files and manifests are written before
//! the warehouse reads them.

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use std::{fmt, io};

pub mod s3;

/// A payload in one of the shapes a stager accepts.
pub enum StageBody {
    Bytes(Bytes),
    Text(String),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl StageBody {
    /// Size in bytes when known up front.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            StageBody::Bytes(b) => Some(b.len() as u64),
            StageBody::Text(s) => Some(s.len() as u64),
            StageBody::Stream(_) => None,
        }
    }

    /// Drains the body into memory.
    pub async fn collect(self) -> Result<Bytes, StoreError> {
        match self {
            StageBody::Bytes(b) => Ok(b),
            StageBody::Text(s) => Ok(Bytes::from(s)),
            StageBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for StageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            StageBody::Text(s) => write!(f, "Text({} bytes)", s.len()),
            StageBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for StageBody {
    fn from(value: Bytes) -> Self {
        StageBody::Bytes(value)
    }
}

impl From<Vec<u8>> for StageBody {
    fn from(value: Vec<u8>) -> Self {
        StageBody::Bytes(Bytes::from(value))
    }
}

impl From<String> for StageBody {
    fn from(value: String) -> Self {
        StageBody::Text(value)
    }
}

impl From<&str> for StageBody {
    fn from(value: &str) -> Self {
        StageBody::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReceipt {
    pub key: String,
    pub bytes: u64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    /// `(key, reason)` for every object the store refused to delete.
    pub errors: Vec<(String, String)>,
}

impl DeleteOutcome {
    pub fn merge(&mut self, other: DeleteOutcome) {
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }
}

/// Writes and removes staged objects.
///
/// Dropping the future returned by [`ObjectStager::put`] aborts the
/// transfer; implementations must not leave a partially written object
/// visible under `key` when that happens.
#[async_trait]
pub trait ObjectStager: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: StageBody,
    ) -> Result<StageReceipt, StoreError>;

    async fn delete_many(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_collect_stream_body() {
        let body = StageBody::Stream(
            stream::iter(vec![
                Ok(Bytes::from_static(b"{\"id\":1}\n")),
                Ok(Bytes::from_static(b"{\"id\":2}\n")),
            ])
            .boxed(),
        );
        assert_eq!(body.len_hint(), None);
        let bytes = body.collect().await.unwrap();
        assert_eq!(&bytes[..], b"{\"id\":1}\n{\"id\":2}\n");
    }

    #[tokio::test]
    async fn test_collect_propagates_stream_error() {
        let body = StageBody::Stream(
            stream::iter(vec![
                Ok(Bytes::from_static(b"a")),
                Err(io::Error::other("disk gone")),
            ])
            .boxed(),
        );
        assert!(matches!(body.collect().await, Err(StoreError::Io(_))));
    }
}
