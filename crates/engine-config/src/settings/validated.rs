use connectors::store::s3::S3Config;
use engine_core::retry::RetryPolicy;
use model::{
    core::table::TableName,
    load::{CleanupPolicy, CopyCredentials, CopyOptions},
};

/// Immutable, validated configuration for one loader.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Table the rows end up in.
    pub table: TableName,
    /// Base name for the upsert temp table; schema and table default to
    /// the target's.
    pub loading_table: Option<TableName>,
    pub bucket: String,
    /// Key prefix for staged objects, placeholders already resolved.
    pub file_prefix: String,
    pub id_column: String,
    /// Drop the upsert temp table before commit.
    pub drop_temp_table: bool,
    pub cleanup: CleanupPolicy,
    /// Wait for staged-object deletion before reporting the outcome.
    pub await_cleanup: bool,
    pub copy: CopyOptions,
    pub credentials: CopyCredentials,
    pub retry: RetryPolicy,
    pub transactional_truncate: bool,
    pub s3: S3Config,
    pub warehouse_url: Option<String>,
}

impl LoaderSettings {
    /// The table the upsert temp table name is derived from.
    pub fn temp_table_base(&self) -> TableName {
        match &self.loading_table {
            Some(loading) => loading.or_parts_of(&self.table),
            None => self.table.clone(),
        }
    }
}
