//! Section content backed by a JSON file on disk.
//!
//! Stands in for the editor: the file is re-read on a timer into a shared
//! snapshot, and the coordinator's content accessor clones that snapshot, so
//! reads stay cheap and never touch the disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use stride_sync_core::ContentSnapshot;

/// Errors loading a section file.
#[derive(Debug)]
pub enum SectionFileError {
    /// I/O error reading the file.
    IoError(PathBuf, io::Error),
    /// The file is not valid JSON.
    ParseError(PathBuf, serde_json::Error),
}

impl std::fmt::Display for SectionFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionFileError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            SectionFileError::ParseError(path, e) => {
                write!(f, "Failed to parse section file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for SectionFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SectionFileError::IoError(_, e) => Some(e),
            SectionFileError::ParseError(_, e) => Some(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionFile {
    path: PathBuf,
    current: Arc<RwLock<ContentSnapshot>>,
}

impl SectionFile {
    /// Opens a section file. A missing file starts as empty content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SectionFileError> {
        let path = path.into();
        let initial = Self::load(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(initial)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Option<ContentSnapshot>, SectionFileError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SectionFileError::ParseError(path.to_path_buf(), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SectionFileError::IoError(path.to_path_buf(), e)),
        }
    }

    /// Returns the last loaded content.
    pub fn snapshot(&self) -> ContentSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns a content accessor for the coordinator.
    pub fn reader(&self) -> impl Fn() -> ContentSnapshot + Send + Sync + 'static {
        let current = self.current.clone();
        move || current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Re-reads the file. Returns true if the content changed.
    ///
    /// A file that disappears keeps the last loaded content.
    pub fn reload(&self) -> Result<bool, SectionFileError> {
        let Some(loaded) = Self::load(&self.path)? else {
            return Ok(false);
        };

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *current == loaded {
            return Ok(false);
        }
        *current = loaded;
        Ok(true)
    }

    /// Reloads the file every `period` until the task is aborted.
    ///
    /// Parse errors (for example a half-written save) keep the previous
    /// content and are retried on the next period.
    pub fn spawn_watch(&self, period: Duration) -> JoinHandle<()> {
        let file = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match file.reload() {
                    Ok(true) => tracing::debug!(path = %file.path.display(), "section content changed"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to reload section file"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let file = SectionFile::open(temp_dir.path().join("section.json")).unwrap();
        assert!(file.snapshot().is_empty());
    }

    #[test]
    fn test_open_reads_content() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("section.json");
        std::fs::write(&path, r#"[{"type":"paragraph","text":"draft"}]"#).unwrap();

        let file = SectionFile::open(&path).unwrap();
        assert_eq!(
            file.snapshot(),
            ContentSnapshot::new(json!([{"type": "paragraph", "text": "draft"}]))
        );
    }

    #[test]
    fn test_reload_detects_change() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("section.json");
        std::fs::write(&path, "1").unwrap();

        let file = SectionFile::open(&path).unwrap();
        let reader = file.reader();
        assert!(!file.reload().unwrap());

        std::fs::write(&path, "2").unwrap();
        assert!(file.reload().unwrap());
        assert_eq!(reader(), ContentSnapshot::new(json!(2)));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("section.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = SectionFile::open(&path);
        assert!(matches!(result, Err(SectionFileError::ParseError(_, _))));
    }

    #[test]
    fn test_reload_keeps_content_when_file_removed() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("section.json");
        std::fs::write(&path, "\"kept\"").unwrap();

        let file = SectionFile::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(!file.reload().unwrap());
        assert_eq!(file.snapshot(), ContentSnapshot::new(json!("kept")));
    }
}
