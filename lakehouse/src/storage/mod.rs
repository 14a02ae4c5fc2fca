pub mod table;

pub use table::{MergeSummary, RewriteReport, VacuumReport, VersionedTable};

use arrow::datatypes::SchemaRef;
use common::config::{StorageBackend, StorageConfig};
use common::{Error, Result};
use deltalake::kernel::transaction::TransactionError;
use deltalake::protocol::SaveMode;
use deltalake::{DeltaOps, DeltaTableBuilder, DeltaTableError};
use object_store::ObjectStore;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::prefix::PrefixStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Directory that marks a table root.
pub const DELTA_LOG_DIR: &str = "_delta_log";

const MEMORY_LOCATION: &str = "memory:///";

/// Where a table lives: `{stage}/{source}/{table}/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableAddress {
    pub stage: String,
    pub source: String,
    pub table: String,
}

impl TableAddress {
    pub fn new(stage: &str, source: &str, table: &str) -> Self {
        Self {
            stage: stage.to_string(),
            source: source.to_string(),
            table: table.to_string(),
        }
    }

    pub fn root(&self) -> Path {
        Path::from(self.stage.as_str())
            .child(self.source.as_str())
            .child(self.table.as_str())
    }
}

impl fmt::Display for TableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.stage, self.source, self.table)
    }
}

/// Maps commit failures to `WriteConflict`, everything else to `Delta`.
pub(crate) fn delta_error(address: &TableAddress, err: DeltaTableError) -> Error {
    let reason = match &err {
        DeltaTableError::VersionAlreadyExists(version)
        | DeltaTableError::Transaction {
            source: TransactionError::VersionAlreadyExists(version),
        } => format!("version {} already exists", version),
        DeltaTableError::Transaction {
            source: TransactionError::CommitConflict(conflict),
        } => conflict.to_string(),
        DeltaTableError::Transaction {
            source: TransactionError::MaxCommitAttempts(attempts),
        } => format!("gave up after {} commit attempts", attempts),
        _ => return Error::Delta(err),
    };

    Error::WriteConflict {
        table: address.to_string(),
        reason,
    }
}

pub fn build_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Local => {
            std::fs::create_dir_all(&config.root)?;
            info!("Using local storage at {}", config.root.display());
            Ok(Arc::new(LocalFileSystem::new_with_prefix(&config.root)?))
        }
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                Error::Config("storage.s3 is required when backend = \"s3\"".to_string())
            })?;
            info!("Using S3 bucket {} at {}", s3.bucket, s3.endpoint);

            // Delta log entries rely on create-if-absent puts.
            let store = AmazonS3Builder::new()
                .with_bucket_name(&s3.bucket)
                .with_region(&s3.region)
                .with_access_key_id(&s3.access_key)
                .with_secret_access_key(&s3.secret_key)
                .with_endpoint(&s3.endpoint)
                .with_allow_http(s3.allow_http)
                .with_conditional_put(S3ConditionalPut::ETagMatch)
                .build()?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(InMemory::new()))
        }
    }
}

/// URL the Delta log store is registered under. Every table gets its own
/// prefixed view of the shared object store.
fn base_location(config: &StorageConfig) -> Result<Url> {
    match config.backend {
        StorageBackend::Local => {
            let root = std::fs::canonicalize(&config.root)?;
            Url::from_directory_path(&root).map_err(|_| {
                Error::Config(format!("storage.root {} is not absolute", root.display()))
            })
        }
        StorageBackend::S3 => {
            deltalake::aws::register_handlers(None);
            let bucket = config
                .s3
                .as_ref()
                .map(|s3| s3.bucket.as_str())
                .unwrap_or_default();
            Ok(Url::parse(&format!("s3://{}/", bucket))?)
        }
        StorageBackend::Memory => Ok(Url::parse(MEMORY_LOCATION)?),
    }
}

/// Entry point to every table kept in one object store.
#[derive(Clone)]
pub struct TableStore {
    store: Arc<dyn ObjectStore>,
    /// `None` addresses tables as `memory:///{root}`.
    location: Option<Url>,
    local_root: Option<PathBuf>,
}

impl TableStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            location: None,
            local_root: None,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store = build_object_store(config)?;
        let location = base_location(config)?;
        let local_root = matches!(config.backend, StorageBackend::Local).then(|| config.root.clone());
        Ok(Self {
            store,
            location: Some(location),
            local_root,
        })
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn builder(&self, address: &TableAddress) -> Result<DeltaTableBuilder> {
        let root = address.root();
        let relative = root.to_string();
        if let Some(local_root) = &self.local_root {
            std::fs::create_dir_all(local_root.join(&relative))?;
        }

        let location = match &self.location {
            Some(base) => base.join(&relative)?,
            None => Url::parse(MEMORY_LOCATION)?.join(&relative)?,
        };
        let table_store: Arc<dyn ObjectStore> =
            Arc::new(PrefixStore::new(self.store.clone(), root));
        Ok(DeltaTableBuilder::from_valid_uri(location.as_str())
            .map_err(|e| delta_error(address, e))?
            .with_storage_backend(table_store, location))
    }

    /// Loads an existing table.
    pub async fn open(&self, address: TableAddress) -> Result<VersionedTable> {
        let table = self
            .builder(&address)?
            .load()
            .await
            .map_err(|e| delta_error(&address, e))?;
        let schema = table::provider_schema(&table);
        Ok(VersionedTable::new(address, table, schema))
    }

    /// Loads the table, creating it empty with `schema` and
    /// `partition_columns` when no log exists yet.
    pub async fn open_or_create(
        &self,
        address: TableAddress,
        schema: SchemaRef,
        partition_columns: &[&str],
    ) -> Result<VersionedTable> {
        let mut table = self.builder(&address)?.build().map_err(|e| delta_error(&address, e))?;

        if table
            .verify_deltatable_existence()
            .await
            .map_err(|e| delta_error(&address, e))?
        {
            table.load().await.map_err(|e| delta_error(&address, e))?;
        } else {
            table = DeltaOps(table)
                .create()
                .with_table_name(address.table.clone())
                .with_columns(table::delta_columns(&schema)?)
                .with_partition_columns(partition_columns.iter().map(|c| c.to_string()))
                .with_save_mode(SaveMode::Ignore)
                .await
                .map_err(|e| delta_error(&address, e))?;
            info!("Created table {} at version {}", address, table.version());
        }

        debug!("Opened table {} at version {}", address, table.version());
        Ok(VersionedTable::new(address, table, schema))
    }

    /// Every `{source}/{table}` directory under `stage` that holds a Delta
    /// log.
    pub async fn list_tables(&self, stage: &str) -> Result<Vec<TableAddress>> {
        let stage_root = Path::from(stage);
        let mut tables = Vec::new();

        let sources = self.store.list_with_delimiter(Some(&stage_root)).await?;
        for source_prefix in sources.common_prefixes {
            let Some(source) = source_prefix.filename() else {
                continue;
            };
            let candidates = self.store.list_with_delimiter(Some(&source_prefix)).await?;
            for table_prefix in candidates.common_prefixes {
                let Some(table) = table_prefix.filename() else {
                    continue;
                };
                let log_dir = table_prefix.child(DELTA_LOG_DIR);
                let entries = self.store.list_with_delimiter(Some(&log_dir)).await?;
                if !entries.objects.is_empty() {
                    tables.push(TableAddress::new(stage, source, table));
                }
            }
        }

        tables.sort();
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{get_neo_schema, NeoSchemaVersion, EVENT_PARTITION_COLUMNS};

    #[test]
    fn test_table_root_layout() {
        let address = TableAddress::new("bronze", "neo", "close_approach_data");
        assert_eq!(address.root().to_string(), "bronze/neo/close_approach_data");
        assert_eq!(address.to_string(), "bronze/neo/close_approach_data");
    }

    #[test]
    fn test_s3_backend_requires_s3_section() {
        let config = StorageConfig {
            backend: StorageBackend::S3,
            root: PathBuf::from("unused"),
            s3: None,
        };
        assert!(matches!(build_object_store(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_commit_races_become_write_conflicts() {
        let address = TableAddress::new("bronze", "neo", "close_approach_data");

        let err = delta_error(&address, DeltaTableError::VersionAlreadyExists(3));
        assert!(matches!(
            err,
            Error::WriteConflict { ref table, ref reason }
                if table == "bronze/neo/close_approach_data" && reason.contains('3')
        ));

        let err = delta_error(
            &address,
            DeltaTableError::Transaction {
                source: TransactionError::MaxCommitAttempts(15),
            },
        );
        assert!(matches!(err, Error::WriteConflict { .. }));

        let err = delta_error(&address, DeltaTableError::NotATable("gone".into()));
        assert!(matches!(err, Error::Delta(_)));
    }

    #[tokio::test]
    async fn test_list_tables_finds_delta_tables_only() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let tables = TableStore::new(store.clone());
        for name in ["asteroid_data", "close_approach_data"] {
            tables
                .open_or_create(
                    TableAddress::new("bronze", "neo", name),
                    get_neo_schema(NeoSchemaVersion::Asteroid),
                    &[],
                )
                .await
                .unwrap();
        }
        // A directory without a log is not a table.
        store
            .put(&Path::from("bronze/neo/scratch/notes.txt"), "x".into())
            .await
            .unwrap();

        let found = tables.list_tables("bronze").await.unwrap();

        assert_eq!(
            found,
            vec![
                TableAddress::new("bronze", "neo", "asteroid_data"),
                TableAddress::new("bronze", "neo", "close_approach_data"),
            ]
        );
        assert!(tables.list_tables("silver").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_table() {
        let tables = TableStore::new(Arc::new(InMemory::new()));

        let result = tables
            .open(TableAddress::new("bronze", "neo", "close_approach_data"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_local_backend_writes_delta_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            root: dir.path().join("lake"),
            s3: None,
        };
        let tables = TableStore::from_config(&config).unwrap();
        let address = TableAddress::new("bronze", "neo", "close_approach_data");

        let created = tables
            .open_or_create(
                address.clone(),
                get_neo_schema(NeoSchemaVersion::CloseApproach),
                &EVENT_PARTITION_COLUMNS,
            )
            .await
            .unwrap();
        assert_eq!(created.version(), Some(0));

        assert!(dir
            .path()
            .join("lake/bronze/neo/close_approach_data/_delta_log/00000000000000000000.json")
            .exists());
        let reopened = tables.open(address).await.unwrap();
        assert_eq!(reopened.version(), Some(0));
        assert_eq!(
            reopened.partition_columns().unwrap(),
            vec!["year", "month", "week"]
        );
    }
}
