//! Object storage abstraction.
//!
//! Provides a unified interface over S3, GCS, the local filesystem, and an
//! in-memory store. A [`StorageProvider`] is the "bucket" handed to the
//! ingestion routine; it owns no process-wide state, so callers (and tests)
//! construct it explicitly and pass it in.

mod gcs;
mod s3;
mod url_parser;

pub use gcs::GcsConfig;
pub use s3::S3Config;
pub use url_parser::{BackendConfig, LocalConfig};

use bytes::Bytes;
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{LocalRootSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Object contents together with the version they were read at.
#[derive(Debug, Clone)]
pub struct VersionedBytes {
    pub bytes: Bytes,
    pub version: UpdateVersion,
}

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    config: BackendConfig,
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new()).await
    }

    /// Create a storage provider for the given URL with storage options
    /// (credentials, region, endpoint overrides).
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, &options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, &options),
            BackendConfig::Local(local) => {
                // A local "bucket" may not exist yet on first use
                tokio::fs::create_dir_all(&local.path)
                    .await
                    .context(LocalRootSnafu { path: &local.path })?;
                let store = LocalFileSystem::new_with_prefix(&local.path)
                    .context(ObjectStoreSnafu)?;
                let canonical_url = format!("file://{}", local.path);
                Ok(Self::with_object_store(
                    BackendConfig::Local(local),
                    Arc::new(store),
                    canonical_url,
                ))
            }
            BackendConfig::Memory { key } => Ok(Self::in_memory_with_key(key)),
        }
    }

    /// Create an empty in-memory provider.
    pub fn in_memory() -> Self {
        Self::in_memory_with_key(None)
    }

    fn in_memory_with_key(key: Option<Path>) -> Self {
        let canonical_url = match &key {
            Some(key) => format!("memory://{key}"),
            None => "memory://".to_string(),
        };
        Self::with_object_store(
            BackendConfig::Memory { key },
            Arc::new(InMemory::new()),
            canonical_url,
        )
    }

    /// Wrap an existing object store.
    ///
    /// This is the injection point for alternative backends and test doubles.
    pub fn with_object_store(
        config: BackendConfig,
        object_store: Arc<dyn ObjectStore>,
        canonical_url: String,
    ) -> Self {
        Self {
            config,
            object_store,
            canonical_url,
        }
    }

    /// Human-readable location of the store root (e.g. `gs://bucket`).
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Strip the configured key prefix so callers get paths relative to the
    /// provider root, matching what get/put expect.
    fn relative_path(&self, path: Path) -> Path {
        match self.config.key() {
            Some(key) => path.parts().skip(key.parts().count()).collect(),
            None => path,
        }
    }

    /// List objects under `prefix`.
    ///
    /// With `include_subdirectories` the listing is recursive; otherwise only
    /// objects directly under `prefix` are returned (delimiter listing).
    /// A missing prefix lists as empty. Results are sorted for a deterministic
    /// discovery order.
    pub async fn list(
        &self,
        prefix: &Path,
        include_subdirectories: bool,
    ) -> Result<Vec<Path>, StorageError> {
        let qualified = self.qualify_path(prefix);
        let qualified = (qualified.parts().next().is_some()).then_some(qualified.as_ref());
        let start = Instant::now();

        let result = if include_subdirectories {
            let mut stream = self.object_store.list(qualified);
            let mut locations = Vec::new();
            let mut outcome = Ok(());
            while let Some(meta) = stream.next().await {
                match meta {
                    Ok(meta) => locations.push(meta.location),
                    Err(object_store::Error::NotFound { .. }) => {}
                    Err(err) => {
                        outcome = Err(err);
                        break;
                    }
                }
            }
            outcome.map(|()| locations)
        } else {
            match self.object_store.list_with_delimiter(qualified).await {
                Ok(listing) => Ok(listing.objects.into_iter().map(|m| m.location).collect()),
                Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
                Err(err) => Err(err),
            }
        };

        observe(StorageOperation::List, result.is_ok(), start);

        let mut paths: Vec<Path> = result
            .context(ObjectStoreSnafu)?
            .into_iter()
            .map(|location| self.relative_path(location))
            .collect();
        paths.sort();

        debug!(
            "Listed {} objects under '{}' in {} (recursive={})",
            paths.len(),
            prefix,
            self.canonical_url,
            include_subdirectories
        );

        Ok(paths)
    }

    /// Check whether an object exists.
    pub async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let qualified = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.head(&qualified).await;

        match result {
            Ok(_) => {
                observe(StorageOperation::Head, true, start);
                Ok(true)
            }
            Err(object_store::Error::NotFound { .. }) => {
                observe(StorageOperation::Head, true, start);
                Ok(false)
            }
            Err(source) => {
                observe(StorageOperation::Head, false, start);
                Err(StorageError::ObjectStore { source })
            }
        }
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        Ok(self.get_versioned(path).await?.bytes)
    }

    /// Get the contents of an object along with its e-tag/version, for use
    /// with a later conditional [`put_with_mode`](Self::put_with_mode).
    pub async fn get_versioned(&self, path: &Path) -> Result<VersionedBytes, StorageError> {
        let qualified = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.get(&qualified).await;
        observe(StorageOperation::Get, result.is_ok(), start);

        let result = result.context(ObjectStoreSnafu)?;
        let version = UpdateVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let bytes = result.bytes().await.context(ObjectStoreSnafu)?;

        Ok(VersionedBytes { bytes, version })
    }

    /// Create or overwrite an object.
    pub async fn put(&self, path: &Path, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        self.put_with_mode(path, bytes, PutMode::Overwrite).await
    }

    /// Write an object with an explicit put mode.
    ///
    /// `PutMode::Create` fails if the object exists and `PutMode::Update`
    /// fails if it changed since the given version; both surface as errors for
    /// which [`StorageError::is_precondition_failed`] returns true.
    pub async fn put_with_mode(
        &self,
        path: &Path,
        bytes: impl Into<Bytes>,
        mode: PutMode,
    ) -> Result<(), StorageError> {
        let qualified = self.qualify_path(path);
        let payload = PutPayload::from(bytes.into());
        let start = Instant::now();
        let result = self
            .object_store
            .put_opts(&qualified, payload, PutOptions::from(mode))
            .await;
        observe(StorageOperation::Put, result.is_ok(), start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}

fn observe(operation: StorageOperation, ok: bool, start: Instant) {
    let status = if ok {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_returns_relative_sorted_paths() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path();

        let nested = base_path.join("balanzas").join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(base_path.join("balanzas").join("b.csv"), b"x").unwrap();
        std::fs::write(base_path.join("balanzas").join("a.csv"), b"x").unwrap();
        std::fs::write(nested.join("c.csv"), b"x").unwrap();

        let storage = StorageProvider::for_url(base_path.to_str().unwrap())
            .await
            .unwrap();

        let recursive = storage
            .list(&Path::from("balanzas"), true)
            .await
            .unwrap();
        let names: Vec<String> = recursive.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            vec!["balanzas/2024/c.csv", "balanzas/a.csv", "balanzas/b.csv"]
        );

        let flat = storage
            .list(&Path::from("balanzas"), false)
            .await
            .unwrap();
        let names: Vec<String> = flat.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["balanzas/a.csv", "balanzas/b.csv"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let storage = StorageProvider::in_memory();
        let listed = storage.list(&Path::from("nothing/here"), true).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_key_prefix_is_stripped() {
        let storage = StorageProvider::for_url("memory://landing").await.unwrap();
        storage
            .put(&Path::from("in/a.csv"), Bytes::from_static(b"a"))
            .await
            .unwrap();

        let listed = storage.list(&Path::from("in"), true).await.unwrap();
        assert_eq!(listed, vec![Path::from("in/a.csv")]);
        assert_eq!(
            storage.get(&listed[0]).await.unwrap(),
            Bytes::from_static(b"a")
        );
    }

    #[tokio::test]
    async fn test_exists() {
        let storage = StorageProvider::in_memory();
        let path = Path::from("ledger.txt");
        assert!(!storage.exists(&path).await.unwrap());

        storage.put(&path, "a.csv").await.unwrap();
        assert!(storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("state.txt"), b"old content").unwrap();

        let storage = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        let path = Path::from("state.txt");
        storage.put(&path, "new content").await.unwrap();

        let read = storage.get(&path).await.unwrap();
        assert_eq!(read.as_ref(), b"new content");
    }

    #[tokio::test]
    async fn test_conditional_update_detects_concurrent_write() {
        let storage = StorageProvider::in_memory();
        let path = Path::from("state.txt");
        storage.put(&path, "v1").await.unwrap();

        let read = storage.get_versioned(&path).await.unwrap();

        // Another writer slips in between read and write
        storage.put(&path, "v2").await.unwrap();

        let err = storage
            .put_with_mode(&path, "v3", PutMode::Update(read.version))
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(storage.get(&path).await.unwrap().as_ref(), b"v2");
    }

    #[tokio::test]
    async fn test_conditional_create_rejects_existing() {
        let storage = StorageProvider::in_memory();
        let path = Path::from("state.txt");

        storage
            .put_with_mode(&path, "first", PutMode::Create)
            .await
            .unwrap();
        let err = storage
            .put_with_mode(&path, "second", PutMode::Create)
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_local_root_is_created_on_first_use() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("landing").join("contabilidad");
        let url = format!("file://{}", root.display());

        let storage = StorageProvider::for_url(&url).await.unwrap();
        assert!(root.is_dir());
        assert!(matches!(storage.config(), BackendConfig::Local(_)));
        assert!(storage.canonical_url().starts_with("file:///"));

        storage
            .put(&Path::from("balanzas/x.csv"), "a\n1\n")
            .await
            .unwrap();
        assert!(root.join("balanzas").join("x.csv").is_file());
    }
}
