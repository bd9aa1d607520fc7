use crate::{
    env::{AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN, EnvSnapshot},
    error::SettingsError,
    settings::{DEFAULT_FILE_PREFIX, DEFAULT_ID_COLUMN, validated::LoaderSettings},
};
use connectors::store::s3::S3Config;
use engine_core::retry::RetryPolicy;
use model::{
    core::table::{TableName, validate_identifier},
    load::{CleanupPolicy, ColumnMapping, CopyCredentials, CopyFormat, CopyOptions},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: Option<usize>,
    pub base_delay_ms: Option<u64>,
    pub multiplier: Option<u32>,
}

impl RetrySettings {
    fn merge_over(self, base: RetrySettings) -> RetrySettings {
        RetrySettings {
            max_retries: self.max_retries.or(base.max_retries),
            base_delay_ms: self.base_delay_ms.or(base.base_delay_ms),
            multiplier: self.multiplier.or(base.multiplier),
        }
    }

    fn to_policy(&self) -> Result<RetryPolicy, SettingsError> {
        let defaults = RetryPolicy::for_serializable_conflicts();
        let multiplier = self.multiplier.unwrap_or(defaults.multiplier);
        if multiplier == 0 {
            return Err(SettingsError::InvalidValue {
                field: "retry.multiplier",
                reason: "must be at least 1".into(),
            });
        }
        Ok(RetryPolicy::new(
            self.max_retries.unwrap_or(defaults.max_retries),
            self.base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            multiplier,
        ))
    }
}

/// Partial loader settings as read from JSON or assembled in code. Unset
/// fields fall back to the layer below on [`merge_over`](Self::merge_over)
/// and to built-in defaults on [`build`](Self::build).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderSettingsBuilder {
    pub table: Option<TableName>,
    pub loading_table: Option<TableName>,
    pub bucket: Option<String>,
    /// May contain `{schema}` and `{table}`.
    pub file_prefix: Option<String>,
    pub id_column: Option<String>,
    pub drop_temp_table: Option<bool>,
    pub cleanup: Option<CleanupPolicy>,
    pub await_cleanup: Option<bool>,
    pub copy: Option<CopyOptions>,
    pub credentials: Option<CopyCredentials>,
    pub retry: Option<RetrySettings>,
    pub transactional_truncate: Option<bool>,
    pub s3: Option<S3Config>,
    pub warehouse_url: Option<String>,
}

impl LoaderSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn table(mut self, table: TableName) -> Self {
        self.table = Some(table);
        self
    }

    pub fn loading_table(mut self, loading_table: TableName) -> Self {
        self.loading_table = Some(loading_table);
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn file_prefix(mut self, file_prefix: impl Into<String>) -> Self {
        self.file_prefix = Some(file_prefix.into());
        self
    }

    pub fn id_column(mut self, id_column: impl Into<String>) -> Self {
        self.id_column = Some(id_column.into());
        self
    }

    pub fn drop_temp_table(mut self, drop_temp_table: bool) -> Self {
        self.drop_temp_table = Some(drop_temp_table);
        self
    }

    pub fn cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn await_cleanup(mut self, await_cleanup: bool) -> Self {
        self.await_cleanup = Some(await_cleanup);
        self
    }

    pub fn copy(mut self, copy: CopyOptions) -> Self {
        self.copy = Some(copy);
        self
    }

    pub fn credentials(mut self, credentials: CopyCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn transactional_truncate(mut self, transactional_truncate: bool) -> Self {
        self.transactional_truncate = Some(transactional_truncate);
        self
    }

    pub fn s3(mut self, s3: S3Config) -> Self {
        self.s3 = Some(s3);
        self
    }

    pub fn warehouse_url(mut self, url: impl Into<String>) -> Self {
        self.warehouse_url = Some(url.into());
        self
    }

    /// Layers `self` on top of `base`: every field set here wins.
    pub fn merge_over(self, base: LoaderSettingsBuilder) -> LoaderSettingsBuilder {
        LoaderSettingsBuilder {
            table: self.table.or(base.table),
            loading_table: self.loading_table.or(base.loading_table),
            bucket: self.bucket.or(base.bucket),
            file_prefix: self.file_prefix.or(base.file_prefix),
            id_column: self.id_column.or(base.id_column),
            drop_temp_table: self.drop_temp_table.or(base.drop_temp_table),
            cleanup: self.cleanup.or(base.cleanup),
            await_cleanup: self.await_cleanup.or(base.await_cleanup),
            copy: self.copy.or(base.copy),
            credentials: self.credentials.or(base.credentials),
            retry: match (self.retry, base.retry) {
                (Some(over), Some(under)) => Some(over.merge_over(under)),
                (over, under) => over.or(under),
            },
            transactional_truncate: self.transactional_truncate.or(base.transactional_truncate),
            s3: self.s3.or(base.s3),
            warehouse_url: self.warehouse_url.or(base.warehouse_url),
        }
    }

    /// Applies defaults, resolves credentials and validates everything the
    /// load will render into SQL.
    pub fn build(self, env: &EnvSnapshot) -> Result<LoaderSettings, SettingsError> {
        let table = self.table.ok_or(SettingsError::Missing("table"))?;
        table
            .validate()
            .map_err(|source| SettingsError::InvalidIdentifier {
                field: "table",
                source,
            })?;

        let loading_table = self.loading_table;
        if let Some(loading) = &loading_table {
            loading
                .or_parts_of(&table)
                .validate()
                .map_err(|source| SettingsError::InvalidIdentifier {
                    field: "loading_table",
                    source,
                })?;
        }

        let bucket = self
            .bucket
            .filter(|b| !b.trim().is_empty())
            .ok_or(SettingsError::Missing("bucket"))?;

        let id_column = self.id_column.unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string());
        validate_identifier(&id_column).map_err(|source| SettingsError::InvalidIdentifier {
            field: "id_column",
            source,
        })?;

        let copy = self.copy.unwrap_or_default();
        validate_copy(&copy)?;

        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => credentials_from_env(env)?,
        };

        let file_prefix = resolve_prefix(
            self.file_prefix.as_deref().unwrap_or(DEFAULT_FILE_PREFIX),
            &table,
        );
        let retry = self.retry.unwrap_or_default().to_policy()?;

        debug!(table = %table, bucket = %bucket, file_prefix = %file_prefix, "Loader settings resolved");

        Ok(LoaderSettings {
            table,
            loading_table,
            bucket,
            file_prefix,
            id_column,
            drop_temp_table: self.drop_temp_table.unwrap_or(true),
            cleanup: self.cleanup.unwrap_or_default(),
            await_cleanup: self.await_cleanup.unwrap_or(true),
            copy,
            credentials,
            retry,
            transactional_truncate: self.transactional_truncate.unwrap_or(false),
            s3: self.s3.unwrap_or_default(),
            warehouse_url: self.warehouse_url,
        })
    }
}

fn credentials_from_env(env: &EnvSnapshot) -> Result<CopyCredentials, SettingsError> {
    match (env.get(AWS_ACCESS_KEY_ID), env.get(AWS_SECRET_ACCESS_KEY)) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(CopyCredentials::AccessKeys {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: env.get(AWS_SESSION_TOKEN).map(str::to_string),
        }),
        _ => Err(SettingsError::MissingCredentials),
    }
}

/// Unqualified tables resolve `{schema}` to `public`.
fn resolve_prefix(template: &str, table: &TableName) -> String {
    template
        .replace("{schema}", table.schema.as_deref().unwrap_or("public"))
        .replace("{table}", &table.table)
}

fn validate_copy(copy: &CopyOptions) -> Result<(), SettingsError> {
    let column_map = match &copy.format {
        CopyFormat::Json { column_map } | CopyFormat::Avro { column_map } => Some(column_map),
        _ => None,
    };
    if let Some(ColumnMapping::Jsonpaths(url)) = column_map {
        if !url.starts_with("s3://") {
            return Err(SettingsError::InvalidValue {
                field: "copy.format.column_map",
                reason: format!("jsonpaths must be an s3:// URL, got '{url}'"),
            });
        }
    }
    if copy.ignore_header > 0 && !matches!(copy.format, CopyFormat::Csv { .. }) {
        return Err(SettingsError::InvalidValue {
            field: "copy.ignore_header",
            reason: "only supported for CSV".into(),
        });
    }
    if let CopyFormat::Csv {
        delimiter: Some(d),
        quote: Some(q),
    } = copy.format
    {
        if d == q {
            return Err(SettingsError::InvalidValue {
                field: "copy.format",
                reason: "delimiter and quote must differ".into(),
            });
        }
    }
    Ok(())
}
