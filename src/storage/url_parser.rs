//! URL parsing for storage backends.
//!
//! Extracts backend configuration from the URL forms accepted for a bucket
//! (S3, GCS, local filesystem, in-memory).

use object_store::path::Path;
use regex::Regex;
use snafu::prelude::*;
use std::sync::OnceLock;

use crate::error::{InvalidUrlSnafu, RegexGroupMissingSnafu, StorageError};

use super::{GcsConfig, S3Config};

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const MEMORY_URL: &str = r"^memory://(?P<key>.*)$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Memory,
    Local,
}

/// Matchers in priority order; `file:` must be tried after `memory://`.
fn matchers() -> &'static [(Backend, Vec<Regex>)] {
    static MATCHERS: OnceLock<Vec<(Backend, Vec<Regex>)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("storage URL pattern must compile"))
                .collect()
        };

        vec![
            (
                Backend::S3,
                compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
            ),
            (Backend::Gcs, compile(&[GCS_PATH, GCS_VIRTUAL, GCS_URL])),
            (Backend::Memory, compile(&[MEMORY_URL])),
            (Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH])),
        ]
    })
}

/// Local filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Local(LocalConfig),
    /// Process-local store, used for tests and dry configuration checks.
    Memory { key: Option<Path> },
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, patterns) in matchers() {
            if let Some(matches) = patterns.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Self::parse_s3(&matches),
                    Backend::Gcs => Self::parse_gcs(&matches),
                    Backend::Memory => Ok(Self::parse_memory(&matches)),
                    Backend::Local => Self::parse_local(&matches),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn required<'a>(
        matches: &'a regex::Captures,
        group: &str,
    ) -> Result<&'a str, StorageError> {
        matches
            .name(group)
            .map(|m| m.as_str())
            .context(RegexGroupMissingSnafu { group })
    }

    fn optional_key(matches: &regex::Captures) -> Option<Path> {
        matches
            .name("key")
            .map(|m| Path::from(m.as_str()))
            .filter(|key| key.parts().next().is_some())
    }

    fn parse_s3(matches: &regex::Captures) -> Result<Self, StorageError> {
        let bucket = Self::required(matches, "bucket")?.to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        Ok(BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: Self::optional_key(matches),
        }))
    }

    fn parse_gcs(matches: &regex::Captures) -> Result<Self, StorageError> {
        let bucket = Self::required(matches, "bucket")?.to_string();

        Ok(BackendConfig::Gcs(GcsConfig {
            bucket,
            key: Self::optional_key(matches),
        }))
    }

    fn parse_memory(matches: &regex::Captures) -> Self {
        BackendConfig::Memory {
            key: Self::optional_key(matches),
        }
    }

    fn parse_local(matches: &regex::Captures) -> Result<Self, StorageError> {
        let path = Self::required(matches, "path")?;

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Ok(BackendConfig::Local(LocalConfig { path }))
    }

    /// Key prefix applied to every path handed to the backend.
    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Memory { key } => key.as_ref(),
            // Local stores are rooted at the path itself
            BackendConfig::Local(_) => None,
        }
    }
}
