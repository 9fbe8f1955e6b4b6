//! Candidate discovery.
//!
//! Lists the ingestion prefix and keeps the objects that match the
//! configured file type and name prefix, excluding the ledger itself.

use object_store::path::Path;

use crate::error::StorageError;
use crate::ledger::LEDGER_FILE_NAME;
use crate::storage::StorageProvider;

/// An object selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Full object path relative to the bucket root.
    pub path: Path,
    /// Trailing path segment; the identity recorded in the ledger.
    pub name: String,
}

impl CandidateFile {
    pub fn new(path: Path) -> Self {
        let name = trailing_name(&path).to_string();
        Self { path, name }
    }
}

/// Last segment of an object path.
pub fn trailing_name(path: &Path) -> &str {
    path.filename().unwrap_or_default()
}

/// Filter applied to listed object names.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    file_type: String,
    file_prefix: Option<String>,
}

impl CandidateFilter {
    pub fn new(file_type: impl Into<String>, file_prefix: Option<String>) -> Self {
        Self {
            file_type: file_type.into(),
            file_prefix,
        }
    }

    /// The object name ends with the file type, the trailing segment starts
    /// with the file prefix (when set) and is not the ledger.
    pub fn matches(&self, path: &Path) -> bool {
        let name = trailing_name(path);
        path.as_ref().ends_with(&self.file_type)
            && self
                .file_prefix
                .as_deref()
                .is_none_or(|prefix| name.starts_with(prefix))
            && name != LEDGER_FILE_NAME
    }
}

/// List `prefix` and return the matching candidates in listing order.
pub async fn discover(
    storage: &StorageProvider,
    prefix: &str,
    flat_listing: bool,
    filter: &CandidateFilter,
) -> Result<Vec<CandidateFile>, StorageError> {
    let listed = storage.list(&Path::from(prefix), !flat_listing).await?;

    Ok(listed
        .into_iter()
        .filter(|path| filter.matches(path))
        .map(CandidateFile::new)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_type_and_prefix() {
        let filter = CandidateFilter::new(".csv", Some("a_".to_string()));
        assert!(filter.matches(&Path::from("in/a_data.csv")));
        assert!(!filter.matches(&Path::from("in/b_other.csv")));
        assert!(!filter.matches(&Path::from("in/a_data.txt")));
        // prefix applies to the trailing segment, not the full path
        assert!(!filter.matches(&Path::from("a_dir/data.csv")));
    }

    #[test]
    fn test_filter_excludes_ledger() {
        let filter = CandidateFilter::new(".txt", None);
        assert!(filter.matches(&Path::from("in/notes.txt")));
        assert!(!filter.matches(&Path::from("in/file_already_read.txt")));
    }

    #[test]
    fn test_trailing_name() {
        assert_eq!(trailing_name(&Path::from("a/b/c.xlsx")), "c.xlsx");
        assert_eq!(trailing_name(&Path::from("c.xlsx")), "c.xlsx");
    }

    #[tokio::test]
    async fn test_discover_flat_and_recursive() {
        let storage = StorageProvider::in_memory();
        for path in [
            "in/a_data.csv",
            "in/b_other.csv",
            "in/a_data.txt",
            "in/2024/a_old.csv",
            "in/file_already_read.txt",
        ] {
            storage.put(&Path::from(path), "x").await.unwrap();
        }

        let filter = CandidateFilter::new(".csv", Some("a_".to_string()));

        let recursive = discover(&storage, "in", false, &filter).await.unwrap();
        let names: Vec<&str> = recursive.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a_old.csv", "a_data.csv"]);

        let flat = discover(&storage, "in", true, &filter).await.unwrap();
        let names: Vec<&str> = flat.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a_data.csv"]);
    }
}
