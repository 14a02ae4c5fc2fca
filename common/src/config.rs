use config::{Config, ConfigError};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::{Error, Result};

/// Largest `end_date - start_date` the NeoWs feed endpoint accepts.
pub const NEOWS_MAX_SPAN_DAYS: u32 = 7;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Only ingestion needs it; see `require_api_key`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_span_days")]
    pub max_span_days: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Root directory for the `local` backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_allow_http")]
    pub allow_http: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default = "default_events_table")]
    pub events_table: String,
    #[serde(default = "default_catalog_table")]
    pub catalog_table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    #[serde(default = "default_reorganize_column")]
    pub reorganize_column: String,
    /// Compaction target in bytes; smaller files are bin-packed up to it.
    #[serde(default = "default_target_file_size")]
    pub target_file_size: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            base_url: default_base_url(),
            api_key: String::new(),
            max_span_days: default_max_span_days(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SourceConfig {
    pub fn require_api_key(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("source.api_key must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_storage_root(),
            s3: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage: default_stage(),
            events_table: default_events_table(),
            catalog_table: default_catalog_table(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            stages: default_stages(),
            reorganize_column: default_reorganize_column(),
            target_file_size: default_target_file_size(),
        }
    }
}

fn default_source_name() -> String {
    "nasa_neows".to_string()
}

fn default_base_url() -> String {
    "https://api.nasa.gov/neo/rest/v1".to_string()
}

fn default_max_span_days() -> u32 {
    NEOWS_MAX_SPAN_DAYS
}

fn default_concurrency() -> usize {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_allow_http() -> bool {
    true
}

fn default_stage() -> String {
    "bronze".to_string()
}

fn default_events_table() -> String {
    "close_approach_data".to_string()
}

fn default_catalog_table() -> String {
    "asteroid_data".to_string()
}

fn default_retention_days() -> u32 {
    7
}

fn default_stages() -> Vec<String> {
    vec!["bronze".to_string(), "silver".to_string(), "gold".to_string()]
}

fn default_reorganize_column() -> String {
    "extraction_date".to_string()
}

fn default_target_file_size() -> u64 {
    128 * 1024 * 1024
}

impl Settings {
    pub fn new(path: &str) -> std::result::Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            source = %settings.source.name,
            backend = ?settings.storage.backend,
            stage = %settings.pipeline.stage,
            "Parsed settings"
        );

        Ok(settings)
    }

    /// Loads and validates in one step.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::new(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks shared by every command. The API key is checked by the
    /// commands that call the API.
    pub fn validate(&self) -> Result<()> {
        if self.source.max_span_days > NEOWS_MAX_SPAN_DAYS {
            return Err(Error::Config(format!(
                "source.max_span_days {} exceeds the feed ceiling of {} days",
                self.source.max_span_days, NEOWS_MAX_SPAN_DAYS
            )));
        }
        if self.source.concurrency == 0 {
            return Err(Error::Config("source.concurrency must be at least 1".into()));
        }
        if self.maintenance.retention_days == 0 {
            return Err(Error::Config(
                "maintenance.retention_days must be at least 1".into(),
            ));
        }
        for (key, value) in [
            ("pipeline.stage", &self.pipeline.stage),
            ("pipeline.events_table", &self.pipeline.events_table),
            ("pipeline.catalog_table", &self.pipeline.catalog_table),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(Error::Config(format!(
                    "{} must be a non-empty name without '/': {:?}",
                    key, value
                )));
            }
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.s3.is_none() {
            return Err(Error::Config(
                "storage.s3 section is required when storage.backend = \"s3\"".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lakehouse.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let (_dir, path) = write_config(
            r#"
            [source]
            api_key = "DEMO_KEY"
            "#,
        );

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.source.name, "nasa_neows");
        assert_eq!(settings.source.max_span_days, 7);
        assert_eq!(settings.storage.backend, StorageBackend::Local);
        assert_eq!(settings.pipeline.events_table, "close_approach_data");
        assert_eq!(settings.pipeline.catalog_table, "asteroid_data");
        assert_eq!(settings.maintenance.retention_days, 7);
        assert_eq!(settings.maintenance.stages, vec!["bronze", "silver", "gold"]);
    }

    #[test]
    fn test_span_above_feed_ceiling_is_rejected() {
        let (_dir, path) = write_config(
            r#"
            [source]
            api_key = "DEMO_KEY"
            max_span_days = 8
            "#,
        );

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let (_dir, path) = write_config(
            r#"
            [source]
            api_key = "DEMO_KEY"

            [maintenance]
            retention_days = 0
            "#,
        );

        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_s3_backend_requires_s3_section() {
        let (_dir, path) = write_config(
            r#"
            [source]
            api_key = "DEMO_KEY"

            [storage]
            backend = "s3"
            "#,
        );

        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_maintenance_host_needs_no_api_key() {
        let (_dir, path) = write_config(
            r#"
            [storage]
            backend = "memory"

            [maintenance]
            retention_days = 3
            "#,
        );

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.maintenance.retention_days, 3);
        assert_eq!(settings.source.name, "nasa_neows");
        assert!(matches!(
            settings.source.require_api_key(),
            Err(Error::Config(_))
        ));
    }
}
