//! Pipeline configuration file support
//!
//! Handles parsing of `post-loader.toml` and `POST_LOADER_*` environment
//! variable overrides. The configuration is built once at process start and
//! passed by reference to whatever needs it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::merge::MergeSettings;
use crate::partition::{ArtifactLocator, PartitionDate, PartitionError};
use crate::warehouse::TableSchema;
use crate::warehouse::schema::DEFAULT_TABLE_NAME;
#[cfg(feature = "duckdb-backend")]
use crate::warehouse::{DuckDBConnector, WarehouseResult};
#[cfg(feature = "redshift-backend")]
use crate::warehouse::RedshiftConnector;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "post-loader.toml";

/// Default Redshift port
pub const DEFAULT_WAREHOUSE_PORT: u16 = 5439;

/// Default local directory standing in for the bucket (DuckDB backend)
pub const DEFAULT_ARTIFACT_ROOT: &str = "data";

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "POST_LOADER_";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// A required setting is empty
    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Amazon Redshift (default)
    #[default]
    Redshift,
    /// Embedded DuckDB
    DuckDB,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redshift" => Ok(BackendType::Redshift),
            "duckdb" => Ok(BackendType::DuckDB),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'redshift' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Redshift => write!(f, "redshift"),
            BackendType::DuckDB => write!(f, "duckdb"),
        }
    }
}

/// `[warehouse]` section
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseSection {
    #[serde(default)]
    pub backend: BackendType,

    #[serde(default)]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Target table
    #[serde(default = "default_table")]
    pub table: String,

    /// DuckDB database file; empty means in-memory
    #[serde(default)]
    pub path: String,

    /// Directory the DuckDB backend reads artifacts from
    #[serde(default = "default_artifact_root")]
    pub artifact_root: String,
}

fn default_port() -> u16 {
    DEFAULT_WAREHOUSE_PORT
}

fn default_table() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_artifact_root() -> String {
    DEFAULT_ARTIFACT_ROOT.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            hostname: String::new(),
            port: default_port(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            table: default_table(),
            path: String::new(),
            artifact_root: default_artifact_root(),
        }
    }
}

impl std::fmt::Debug for WarehouseSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseSection")
            .field("backend", &self.backend)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"****")
            .field("table", &self.table)
            .field("path", &self.path)
            .field("artifact_root", &self.artifact_root)
            .finish()
    }
}

/// `[aws]` section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AwsSection {
    #[serde(default)]
    pub bucket_name: String,

    #[serde(default)]
    pub account_id: String,

    /// Role the warehouse assumes to read the bucket
    #[serde(default)]
    pub redshift_role: String,

    #[serde(default)]
    pub region: String,
}

/// Main configuration structure
///
/// Represents the `post-loader.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub aws: AwsSection,
}

impl PipelineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a local DuckDB run
    pub fn duckdb(path: impl Into<String>, artifact_root: impl Into<String>) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: BackendType::DuckDB,
                path: path.into(),
                artifact_root: artifact_root.into(),
                ..Default::default()
            },
            aws: AwsSection {
                bucket_name: "local".to_string(),
                ..Default::default()
            },
        }
    }

    /// Load configuration from a file, then apply environment overrides
    ///
    /// A missing file yields the defaults, so a deployment may configure
    /// itself entirely from the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply `POST_LOADER_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from `lookup`, keyed without the `POST_LOADER_` prefix
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("WAREHOUSE_BACKEND") {
            self.warehouse.backend = backend.parse().map_err(|message| ConfigError::Invalid {
                key: "warehouse.backend",
                message,
            })?;
        }
        if let Some(port) = lookup("WAREHOUSE_PORT") {
            self.warehouse.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "warehouse.port",
                message: format!("'{}' is not a port number", port),
            })?;
        }

        let strings: [(&str, &mut String); 11] = [
            ("WAREHOUSE_HOSTNAME", &mut self.warehouse.hostname),
            ("WAREHOUSE_DATABASE", &mut self.warehouse.database),
            ("WAREHOUSE_USERNAME", &mut self.warehouse.username),
            ("WAREHOUSE_PASSWORD", &mut self.warehouse.password),
            ("WAREHOUSE_TABLE", &mut self.warehouse.table),
            ("WAREHOUSE_PATH", &mut self.warehouse.path),
            ("WAREHOUSE_ARTIFACT_ROOT", &mut self.warehouse.artifact_root),
            ("AWS_BUCKET_NAME", &mut self.aws.bucket_name),
            ("AWS_ACCOUNT_ID", &mut self.aws.account_id),
            ("AWS_REDSHIFT_ROLE", &mut self.aws.redshift_role),
            ("AWS_REGION", &mut self.aws.region),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        Ok(())
    }

    /// Check that the settings the selected backend needs are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn require(value: &str, key: &'static str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                Err(ConfigError::Missing(key))
            } else {
                Ok(())
            }
        }

        require(&self.warehouse.table, "warehouse.table")?;
        require(&self.aws.bucket_name, "aws.bucket_name")?;

        match self.warehouse.backend {
            BackendType::Redshift => {
                require(&self.warehouse.hostname, "warehouse.hostname")?;
                require(&self.warehouse.database, "warehouse.database")?;
                require(&self.warehouse.username, "warehouse.username")?;
                require(&self.warehouse.password, "warehouse.password")?;
                require(&self.aws.account_id, "aws.account_id")?;
                require(&self.aws.redshift_role, "aws.redshift_role")?;
                if !self.aws.account_id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ConfigError::Invalid {
                        key: "aws.account_id",
                        message: "expected a numeric account id".to_string(),
                    });
                }
            }
            BackendType::DuckDB => {
                require(&self.warehouse.artifact_root, "warehouse.artifact_root")?;
            }
        }

        Ok(())
    }

    /// ARN of the role the warehouse assumes to read the bucket
    ///
    /// Empty when no account or role is configured.
    pub fn role_arn(&self) -> String {
        if self.aws.account_id.is_empty() || self.aws.redshift_role.is_empty() {
            return String::new();
        }
        format!(
            "arn:aws:iam::{}:role/{}",
            self.aws.account_id, self.aws.redshift_role
        )
    }

    /// Get the DuckDB database path; `None` means in-memory
    pub fn duckdb_path(&self) -> Option<PathBuf> {
        if self.warehouse.path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.warehouse.path))
        }
    }

    /// Location of `partition`'s artifact in the configured bucket
    pub fn artifact(&self, partition: PartitionDate) -> Result<ArtifactLocator, PartitionError> {
        ArtifactLocator::new(&self.aws.bucket_name, partition)
    }

    /// Merge settings for the configured target table
    pub fn merge_settings(&self) -> Result<MergeSettings, ConfigError> {
        let table = TableSchema::records(&self.warehouse.table).map_err(|e| ConfigError::Invalid {
            key: "warehouse.table",
            message: e.to_string(),
        })?;
        Ok(MergeSettings::new(table, self.role_arn()))
    }

    #[cfg(feature = "redshift-backend")]
    pub fn redshift_connector(&self) -> RedshiftConnector {
        RedshiftConnector::new(
            &self.warehouse.hostname,
            self.warehouse.port,
            &self.warehouse.database,
            &self.warehouse.username,
            &self.warehouse.password,
        )
    }

    #[cfg(feature = "duckdb-backend")]
    pub fn duckdb_connector(&self) -> WarehouseResult<DuckDBConnector> {
        let root = PathBuf::from(&self.warehouse.artifact_root);
        match self.duckdb_path() {
            Some(path) => DuckDBConnector::open(path, root),
            None => DuckDBConnector::in_memory(root),
        }
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# post-loader configuration
# Every value can be overridden with POST_LOADER_<SECTION>_<KEY>,
# e.g. POST_LOADER_WAREHOUSE_PASSWORD.

[warehouse]
# Warehouse backend: "redshift" (default) or "duckdb"
backend = "redshift"
hostname = "my-cluster.abc123.eu-west-2.redshift.amazonaws.com"
port = 5439
database = "dev"
username = "awsuser"
# password = "..."   (prefer POST_LOADER_WAREHOUSE_PASSWORD)

# Target table
table = "reddit"

# DuckDB only: database file (empty for in-memory) and the local
# directory that stands in for the bucket
path = ""
artifact_root = "data"

[aws]
bucket_name = "reddit-posts-bucket"
account_id = "123456789012"
# Role granting the warehouse read access to the bucket
redshift_role = "RedShiftLoadRole"
region = "eu-west-2"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn redshift_config() -> PipelineConfig {
        PipelineConfig::parse(
            r#"
[warehouse]
hostname = "cluster.example"
database = "dev"
username = "awsuser"
password = "s3cret"

[aws]
bucket_name = "reddit-bucket"
account_id = "123456789012"
redshift_role = "RedShiftS3"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::new();
        assert_eq!(config.warehouse.backend, BackendType::Redshift);
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.warehouse.table, "reddit");
        assert!(config.duckdb_path().is_none());
    }

    #[test]
    fn test_parse_and_validate() {
        let config = redshift_config();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.role_arn(),
            "arn:aws:iam::123456789012:role/RedShiftS3"
        );
    }

    #[test]
    fn test_validate_reports_missing() {
        let mut config = redshift_config();
        config.warehouse.password.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("warehouse.password"))
        ));
    }

    #[test]
    fn test_duckdb_needs_no_credentials() {
        let config = PipelineConfig::duckdb("", "artifacts");
        assert!(config.validate().is_ok());
        assert_eq!(config.role_arn(), "");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("WAREHOUSE_BACKEND", "duckdb"),
            ("WAREHOUSE_PASSWORD", "from-env"),
            ("WAREHOUSE_PORT", "5440"),
        ]
        .into_iter()
        .collect();

        let mut config = redshift_config();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.warehouse.backend, BackendType::DuckDB);
        assert_eq!(config.warehouse.password, "from-env");
        assert_eq!(config.warehouse.port, 5440);
        assert_eq!(config.warehouse.hostname, "cluster.example");
    }

    #[test]
    fn test_bad_override() {
        let mut config = PipelineConfig::new();
        let result = config.apply_overrides(|k| (k == "WAREHOUSE_PORT").then(|| "abc".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_debug_masks_password() {
        let config = redshift_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        redshift_config().save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.aws.bucket_name, "reddit-bucket");
    }

    #[test]
    fn test_sample_config_parses() {
        let config = PipelineConfig::parse(sample_config()).unwrap();
        assert_eq!(config.warehouse.backend, BackendType::Redshift);
        assert_eq!(config.aws.redshift_role, "RedShiftLoadRole");
    }
}
