//! Configuration parsing and validation.
//!
//! Loads the YAML job description consumed by the `sleet` binary: where to
//! look for files, how to read them, where (optionally) to write the result.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyFileTypeSnafu, EmptySinkPathSnafu, EmptySourceUrlSnafu,
    EnvInterpolationSnafu, InvalidDelimiterSnafu, ReadFileSnafu, YamlParseSnafu,
};
use crate::ingest::IngestRequest;
use crate::ledger::LedgerWriteMode;
use crate::source::ReadOptions;

/// Main configuration structure for an ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    /// Reader options passed through to the table readers.
    #[serde(default)]
    pub read: ReadOptions,
    /// Where to write the concatenated result (optional).
    #[serde(default)]
    pub sink: Option<SinkConfig>,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Source configuration: the bucket, the prefix and the candidate filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Bucket URL.
    /// Examples: "gs://contabilidad-raw", "s3://bucket", "/local/landing"
    pub url: String,

    /// Path prefix under the bucket to scan. The ledger lives directly
    /// under it.
    #[serde(default)]
    pub prefix: String,

    /// Required name suffix for candidate files (e.g. ".xlsx").
    pub file_type: String,

    /// Required start of the trailing name segment (optional).
    #[serde(default)]
    pub file_prefix: Option<String>,

    /// List only objects directly under the prefix (default: recursive).
    #[serde(default)]
    pub flat_listing: bool,

    /// Consult and update the processed-file ledger (default: true).
    #[serde(default = "default_use_ledger")]
    pub use_ledger: bool,

    /// How the ledger is written back.
    #[serde(default)]
    pub ledger_write: LedgerWriteMode,

    /// Label attached to metrics for this job (defaults to the prefix).
    #[serde(default)]
    pub target: Option<String>,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_use_ledger() -> bool {
    true
}

/// Sink configuration for writing the result as Parquet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory URL the Parquet object is written under.
    /// Examples: "gs://warehouse-staging/balanzas", "/tmp/out"
    pub path: String,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content, interpolate_env)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            match vars::expand(content) {
                Ok(expanded) => expanded,
                Err(problems) => {
                    return EnvInterpolationSnafu {
                        message: problems.join("; "),
                    }
                    .fail();
                }
            }
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.url.trim().is_empty(), EmptySourceUrlSnafu);
        ensure!(!self.source.file_type.is_empty(), EmptyFileTypeSnafu);
        if let Some(sink) = &self.sink {
            ensure!(!sink.path.trim().is_empty(), EmptySinkPathSnafu);
        }
        if let Some(delimiter) = self.read.delimiter {
            ensure!(
                delimiter.is_ascii(),
                InvalidDelimiterSnafu {
                    value: delimiter.to_string()
                }
            );
        }
        Ok(())
    }

    /// Build the ingestion request described by this configuration.
    pub fn ingest_request(&self) -> IngestRequest {
        let source = &self.source;
        let mut request = IngestRequest::new(&source.prefix, &source.file_type)
            .with_flat_listing(source.flat_listing)
            .with_ledger(source.use_ledger)
            .with_ledger_write(source.ledger_write)
            .with_read_options(self.read.clone());
        if let Some(file_prefix) = &source.file_prefix {
            request = request.with_file_prefix(file_prefix);
        }
        if let Some(target) = &source.target {
            request = request.with_target(target);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SheetSelection;

    #[test]
    fn test_minimal_config_defaults() {
        let yaml = r#"
source:
  url: "gs://contabilidad-raw"
  file_type: ".xlsx"
"#;
        let config = Config::from_yaml(yaml, false).unwrap();
        assert_eq!(config.source.prefix, "");
        assert!(config.source.use_ledger);
        assert!(!config.source.flat_listing);
        assert_eq!(config.source.ledger_write, LedgerWriteMode::Overwrite);
        assert!(config.read.header);
        assert_eq!(config.read.skip_rows, 0);
        assert!(config.sink.is_none());
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.address, "0.0.0.0:9090");
    }

    #[test]
    fn test_full_config_yaml_parsing() {
        let yaml = r#"
source:
  url: "gs://contabilidad-raw"
  prefix: "balanzas/2024"
  file_type: ".csv"
  file_prefix: "BZ_"
  flat_listing: true
  use_ledger: false
  ledger_write: conditional
  target: balanzas

read:
  delimiter: ";"
  header: false
  skip_rows: 2
  encoding: latin1
  sheet: "Balanza"

sink:
  path: "/tmp/sleet-out"
  compression: zstd

metrics:
  enabled: true
  address: "127.0.0.1:9100"
"#;
        let config = Config::from_yaml(yaml, false).unwrap();
        assert_eq!(config.source.file_prefix.as_deref(), Some("BZ_"));
        assert!(config.source.flat_listing);
        assert!(!config.source.use_ledger);
        assert_eq!(config.source.ledger_write, LedgerWriteMode::Conditional);
        assert_eq!(config.read.delimiter, Some(';'));
        assert!(!config.read.header);
        assert_eq!(config.read.skip_rows, 2);
        assert_eq!(config.read.encoding, "latin1");
        assert_eq!(
            config.read.sheet,
            Some(SheetSelection::Name("Balanza".to_string()))
        );

        let sink = config.sink.as_ref().unwrap();
        assert_eq!(sink.compression, ParquetCompression::Zstd);
        assert!(config.metrics.enabled);

        let request = config.ingest_request();
        assert_eq!(request.prefix, "balanzas/2024");
        assert_eq!(request.file_prefix.as_deref(), Some("BZ_"));
        assert!(request.flat_listing);
        assert!(!request.use_ledger);
        assert_eq!(request.target, "balanzas");
    }

    #[test]
    fn test_sheet_index_selection() {
        let yaml = r#"
source:
  url: "memory://"
  file_type: ".xlsx"
read:
  sheet: 1
"#;
        let config = Config::from_yaml(yaml, false).unwrap();
        assert_eq!(config.read.sheet, Some(SheetSelection::Index(1)));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let yaml = r#"
source:
  url: ""
  file_type: ".csv"
"#;
        assert!(matches!(
            Config::from_yaml(yaml, false),
            Err(ConfigError::EmptySourceUrl)
        ));

        let yaml = r#"
source:
  url: "memory://"
  file_type: ""
"#;
        assert!(matches!(
            Config::from_yaml(yaml, false),
            Err(ConfigError::EmptyFileType)
        ));

        let yaml = r#"
source:
  url: "memory://"
  file_type: ".csv"
sink:
  path: " "
"#;
        assert!(matches!(
            Config::from_yaml(yaml, false),
            Err(ConfigError::EmptySinkPath)
        ));
    }

    #[test]
    fn test_validate_rejects_non_ascii_delimiter() {
        let yaml = r#"
source:
  url: "memory://"
  file_type: ".csv"
read:
  delimiter: "§"
"#;
        assert!(matches!(
            Config::from_yaml(yaml, false),
            Err(ConfigError::InvalidDelimiter { .. })
        ));
    }

    #[test]
    fn test_missing_env_var_is_reported() {
        let yaml = r#"
source:
  url: "gs://${SLEET_CONFIG_TEST_UNSET_BUCKET}"
  file_type: ".csv"
"#;
        let err = Config::from_yaml(yaml, true).unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
        assert!(err.to_string().contains("SLEET_CONFIG_TEST_UNSET_BUCKET"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(
            &path,
            "source:\n  url: \"memory://\"\n  file_type: \".csv\"\n  prefix: in\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.source.prefix, "in");
    }
}
