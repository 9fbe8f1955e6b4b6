//! Processed-file ledger.
//!
//! The ledger is a plain UTF-8 object stored directly under the ingestion
//! prefix, one file name per line with no header and no escaping. It is read
//! once per run and written back at most once, after the run has parsed at
//! least one new file.

use object_store::PutMode;
use object_store::UpdateVersion;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{
    LedgerConflictSnafu, LedgerEncodingSnafu, LedgerError, LedgerReadSnafu, LedgerWriteSnafu,
};
use crate::storage::StorageProvider;

/// Object name of the ledger under the ingestion prefix.
pub const LEDGER_FILE_NAME: &str = "file_already_read.txt";

/// Permission the run identity needs for the ledger write to succeed.
pub const WRITE_PERMISSION_HINT: &str = "storage.objects.create";

/// How the updated ledger is written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerWriteMode {
    /// Unconditional overwrite; concurrent runs are last-writer-wins.
    #[default]
    Overwrite,
    /// Create-if-absent or update-if-unchanged; a concurrent modification
    /// fails the write with [`LedgerError::LedgerConflict`].
    Conditional,
}

/// Location of the ledger for a given ingestion prefix.
pub fn ledger_path(prefix: &str) -> Path {
    Path::from(prefix).child(LEDGER_FILE_NAME)
}

/// In-memory view of the ledger as it was read at the start of a run.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: Path,
    entries: Vec<String>,
    names: HashSet<String>,
    /// Version the ledger was read at; `None` when no ledger existed.
    version: Option<UpdateVersion>,
}

impl Ledger {
    /// An empty ledger that does not yet exist in storage.
    pub fn empty(path: Path) -> Self {
        Self::from_entries(path, Vec::new(), None)
    }

    fn from_entries(path: Path, entries: Vec<String>, version: Option<UpdateVersion>) -> Self {
        let names = entries.iter().cloned().collect();
        Self {
            path,
            entries,
            names,
            version,
        }
    }

    /// Read the ledger stored under `prefix`. A missing ledger is empty.
    pub async fn load(storage: &StorageProvider, prefix: &str) -> Result<Self, LedgerError> {
        let path = ledger_path(prefix);

        let versioned = match storage.get_versioned(&path).await {
            Ok(versioned) => versioned,
            Err(e) if e.is_not_found() => {
                debug!("No ledger at {}, starting empty", path);
                return Ok(Self::empty(path));
            }
            Err(source) => {
                return Err(source).context(LedgerReadSnafu {
                    path: path.to_string(),
                });
            }
        };

        let text = String::from_utf8(versioned.bytes.to_vec()).context(LedgerEncodingSnafu {
            path: path.to_string(),
        })?;
        let entries = Self::parse(&text);

        debug!("Loaded {} ledger entries from {}", entries.len(), path);
        Ok(Self::from_entries(path, entries, Some(versioned.version)))
    }

    /// Split ledger text into names: one per line, trimmed, blank lines dropped.
    pub fn parse(text: &str) -> Vec<String> {
        text.split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether `name` was recorded by an earlier run.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names in the order they were read.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the ledger object existed when it was read.
    pub fn exists(&self) -> bool {
        self.version.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous entries followed by `additions`, newline-joined.
    pub fn render(&self, additions: &[String]) -> String {
        self.entries
            .iter()
            .chain(additions)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the previous entries plus `additions` back to storage.
    ///
    /// Returns the total number of entries written.
    pub async fn save(
        &self,
        storage: &StorageProvider,
        additions: &[String],
        mode: LedgerWriteMode,
    ) -> Result<usize, LedgerError> {
        let body = self.render(additions);
        let put_mode = match (mode, &self.version) {
            (LedgerWriteMode::Overwrite, _) => PutMode::Overwrite,
            (LedgerWriteMode::Conditional, Some(version)) => PutMode::Update(version.clone()),
            (LedgerWriteMode::Conditional, None) => PutMode::Create,
        };

        match storage.put_with_mode(&self.path, body, put_mode).await {
            Ok(()) => {
                let total = self.entries.len() + additions.len();
                debug!("Wrote {} ledger entries to {}", total, self.path);
                Ok(total)
            }
            Err(e) if mode == LedgerWriteMode::Conditional && e.is_precondition_failed() => {
                LedgerConflictSnafu {
                    path: self.path.to_string(),
                }
                .fail()
            }
            Err(source) => Err(source).context(LedgerWriteSnafu {
                path: self.path.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_path() {
        assert_eq!(
            ledger_path("balanzas/2024").to_string(),
            "balanzas/2024/file_already_read.txt"
        );
        assert_eq!(
            ledger_path("balanzas/2024/").to_string(),
            "balanzas/2024/file_already_read.txt"
        );
        assert_eq!(ledger_path("").to_string(), "file_already_read.txt");
    }

    #[test]
    fn test_parse_trims_and_drops_blank_lines() {
        let entries = Ledger::parse("a.csv\r\n\n  b.csv  \n\n");
        assert_eq!(entries, vec!["a.csv", "b.csv"]);
        assert!(Ledger::parse("").is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_ledger_is_empty() {
        let storage = StorageProvider::in_memory();
        let ledger = Ledger::load(&storage, "in").await.unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.exists());
        assert!(!ledger.contains("a.csv"));
    }

    #[tokio::test]
    async fn test_load_then_save_appends() {
        let storage = StorageProvider::in_memory();
        let path = ledger_path("in");
        storage.put(&path, "old.csv\n").await.unwrap();

        let ledger = Ledger::load(&storage, "in").await.unwrap();
        assert!(ledger.exists());
        assert!(ledger.contains("old.csv"));

        let total = ledger
            .save(
                &storage,
                &["x.csv".to_string(), "y.csv".to_string()],
                LedgerWriteMode::Overwrite,
            )
            .await
            .unwrap();
        assert_eq!(total, 3);

        let written = storage.get(&path).await.unwrap();
        assert_eq!(written.as_ref(), b"old.csv\nx.csv\ny.csv");
    }

    #[tokio::test]
    async fn test_load_rejects_non_utf8() {
        let storage = StorageProvider::in_memory();
        storage
            .put(&ledger_path("in"), vec![0xff_u8, 0xfe, 0x00])
            .await
            .unwrap();

        let err = Ledger::load(&storage, "in").await.unwrap_err();
        assert!(matches!(err, LedgerError::LedgerEncoding { .. }));
    }

    #[tokio::test]
    async fn test_conditional_save_creates_when_absent() {
        let storage = StorageProvider::in_memory();
        let ledger = Ledger::load(&storage, "in").await.unwrap();

        ledger
            .save(&storage, &["a.csv".to_string()], LedgerWriteMode::Conditional)
            .await
            .unwrap();
        assert_eq!(
            storage.get(&ledger_path("in")).await.unwrap().as_ref(),
            b"a.csv"
        );
    }

    #[tokio::test]
    async fn test_conditional_save_detects_concurrent_run() {
        let storage = StorageProvider::in_memory();
        let path = ledger_path("in");
        storage.put(&path, "a.csv").await.unwrap();

        let ledger = Ledger::load(&storage, "in").await.unwrap();

        // Another run records its file first
        storage.put(&path, "a.csv\nb.csv").await.unwrap();

        let err = ledger
            .save(&storage, &["c.csv".to_string()], LedgerWriteMode::Conditional)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::LedgerConflict { .. }));
        assert_eq!(storage.get(&path).await.unwrap().as_ref(), b"a.csv\nb.csv");
    }

    #[tokio::test]
    async fn test_conditional_create_conflicts_with_new_ledger() {
        let storage = StorageProvider::in_memory();
        let ledger = Ledger::load(&storage, "in").await.unwrap();

        storage.put(&ledger_path("in"), "b.csv").await.unwrap();

        let err = ledger
            .save(&storage, &["a.csv".to_string()], LedgerWriteMode::Conditional)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::LedgerConflict { .. }));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let storage = StorageProvider::in_memory();
        let path = ledger_path("in");
        let ledger = Ledger::load(&storage, "in").await.unwrap();

        storage.put(&path, "b.csv").await.unwrap();

        ledger
            .save(&storage, &["a.csv".to_string()], LedgerWriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(storage.get(&path).await.unwrap().as_ref(), b"a.csv");
    }
}
