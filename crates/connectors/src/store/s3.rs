use crate::{
    error::StoreError,
    store::{DeleteOutcome, ObjectStager, StageBody, StageReceipt},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::{fmt, io};
use tracing::{debug, info, warn};

/// Smallest part S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// `DeleteObjects` accepts at most this many keys per request.
pub const DELETE_BATCH: usize = 1000;

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub path_style: bool,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

#[derive(Clone)]
pub struct S3Stager {
    client: Client,
    part_size: usize,
}

fn s3_error<E>(op: &'static str, key: &str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::S3 {
        op,
        key: key.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

impl S3Stager {
    /// Builds a client from explicit keys when both are set, otherwise from
    /// the default AWS provider chain.
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access,
                secret,
                config.session_token.clone(),
                None,
                "redload",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = ?config.region, endpoint = ?config.endpoint, "S3 stager initialized");
        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            part_size: MIN_PART_SIZE,
        }
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> Result<StageReceipt, StoreError> {
        let size = data.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| s3_error("PutObject", key, e))?;

        Ok(StageReceipt {
            key: key.to_string(),
            bytes: size,
            etag: output.e_tag().map(str::to_string),
        })
    }

    /// Streams the body in `part_size` chunks. A body that fits in one part
    /// is sent with a plain PUT instead.
    async fn put_stream(
        &self,
        bucket: &str,
        key: &str,
        mut stream: BoxStream<'static, io::Result<Bytes>>,
    ) -> Result<StageReceipt, StoreError> {
        let mut buffer = BytesMut::new();
        while buffer.len() < self.part_size {
            match stream.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => return self.put_single(bucket, key, buffer.freeze()).await,
            }
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("CreateMultipartUpload", key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Other(format!("No upload id returned for '{key}'")))?
            .to_string();

        match self
            .upload_parts(bucket, key, &upload_id, buffer, &mut stream)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %DisplayErrorContext(abort_err), "Failed to abort multipart upload");
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut buffer: BytesMut,
        stream: &mut BoxStream<'static, io::Result<Bytes>>,
    ) -> Result<StageReceipt, StoreError> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut exhausted = false;

        while !exhausted || !buffer.is_empty() {
            while !exhausted && buffer.len() < self.part_size {
                match stream.next().await {
                    Some(chunk) => buffer.extend_from_slice(&chunk?),
                    None => exhausted = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let take = buffer.len().min(self.part_size);
            let part = buffer.split_to(take).freeze();
            let part_number = parts.len() as i32 + 1;
            total += part.len() as u64;

            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| s3_error("UploadPart", key, e))?;

            debug!(key, part_number, "Uploaded part");
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| s3_error("CompleteMultipartUpload", key, e))?;

        Ok(StageReceipt {
            key: key.to_string(),
            bytes: total,
            etag: completed.e_tag().map(str::to_string),
        })
    }
}

#[async_trait]
impl ObjectStager for S3Stager {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: StageBody,
    ) -> Result<StageReceipt, StoreError> {
        debug!(bucket, key, size = ?body.len_hint(), "Staging object");
        let receipt = match body {
            StageBody::Bytes(data) => self.put_single(bucket, key, data).await?,
            StageBody::Text(text) => self.put_single(bucket, key, Bytes::from(text)).await?,
            StageBody::Stream(stream) => self.put_stream(bucket, key, stream).await?,
        };
        debug!(bucket, key, bytes = receipt.bytes, "Staged object");
        Ok(receipt)
    }

    async fn delete_many(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteOutcome, StoreError> {
        let mut outcome = DeleteOutcome::default();

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| StoreError::Other(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StoreError::Other(e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| s3_error("DeleteObjects", &batch[0], e))?;

            let failed: Vec<(String, String)> = output
                .errors()
                .iter()
                .map(|e| {
                    (
                        e.key().unwrap_or_default().to_string(),
                        e.message().unwrap_or("unknown error").to_string(),
                    )
                })
                .collect();
            outcome.deleted.extend(
                batch
                    .iter()
                    .filter(|k| !failed.iter().any(|(f, _)| f == *k))
                    .cloned(),
            );
            outcome.errors.extend(failed);
        }

        info!(
            bucket,
            deleted = outcome.deleted.len(),
            failed = outcome.errors.len(),
            "Deleted staged objects"
        );
        Ok(outcome)
    }
}
