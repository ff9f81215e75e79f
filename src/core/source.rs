//! Watched query files and their change detection.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::{debug, warn};

use super::{
    collectors::{error::ExporterError, types::ExporterResult},
    fs::FileSystem,
};

/// One watched query file.
///
/// Created once at startup for each configured path and kept for the whole
/// life of the process. The modification time is the last one observed; the
/// metric names are the ones registered from the file's latest successful
/// load.
#[derive(Debug, Clone)]
pub struct QuerySource {
    path: PathBuf,
    modified: Option<SystemTime>,
    metrics: Vec<String>,
    loaded: bool,
}

impl QuerySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            metrics: Vec::new(),
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Metric names registered from this file.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Whether the file's definitions have been loaded at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Records the metrics loaded from the current version of the file.
    pub fn set_metrics(&mut self, metrics: Vec<String>) {
        self.metrics = metrics;
        self.loaded = true;
    }

    /// Forces the next cycle to parse the file again, changed or not.
    ///
    /// Used when a load failed after the new modification time was already
    /// recorded. The metric names of the last good load are kept.
    pub fn invalidate(&mut self) {
        self.loaded = false;
    }

    /// Reports whether the file changed since the previous check.
    ///
    /// The first successful check only records a baseline and returns
    /// `false`. Afterwards the result is `true` exactly when the file's
    /// modification time is strictly later than the recorded one, and the
    /// recorded time moves forward. A failed stat returns the error and leaves
    /// the recorded time untouched.
    pub async fn is_modified(&mut self, fs: &dyn FileSystem) -> ExporterResult<bool> {
        let current = fs.modified(&self.path).await.map_err(|source| {
            warn!("Failed to stat {}: {}", self.path.display(), source);
            ExporterError::Stat {
                path: self.path.clone(),
                source,
            }
        })?;

        let Some(previous) = self.modified else {
            debug!("Baseline for {}: {:?}", self.path.display(), current);
            self.modified = Some(current);
            return Ok(false);
        };

        let modified = current > previous;
        debug!(
            "Checked {}: current={:?} previous={:?} modified={}",
            self.path.display(),
            current,
            previous,
            modified
        );
        if modified {
            self.modified = Some(current);
        }

        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::core::fs::fake::FakeFileSystem;

    const PATH: &str = "/queries/active_users.sql";

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn first_check_is_a_baseline() {
        let fs = FakeFileSystem::new();
        fs.write(PATH, at(100), "");
        let mut source = QuerySource::new(PATH);

        assert!(!source.is_modified(&fs).await.unwrap());
        assert_eq!(source.last_modified(), Some(at(100)));
    }

    #[tokio::test]
    async fn first_check_failure_records_nothing() {
        let fs = FakeFileSystem::new();
        let mut source = QuerySource::new(PATH);

        let err = source.is_modified(&fs).await.unwrap_err();
        assert!(matches!(err, ExporterError::Stat { .. }));
        assert_eq!(source.last_modified(), None);

        // Retried on the next call, which then becomes the baseline.
        fs.write(PATH, at(5), "");
        assert!(!source.is_modified(&fs).await.unwrap());
        assert_eq!(source.last_modified(), Some(at(5)));
    }

    #[tokio::test]
    async fn later_mtime_reports_modified_once() {
        let fs = FakeFileSystem::new();
        fs.write(PATH, at(100), "");
        let mut source = QuerySource::new(PATH);
        source.is_modified(&fs).await.unwrap();

        fs.touch(PATH, at(200));
        assert!(source.is_modified(&fs).await.unwrap());
        assert_eq!(source.last_modified(), Some(at(200)));
        assert!(!source.is_modified(&fs).await.unwrap());
    }

    #[tokio::test]
    async fn equal_or_earlier_mtime_is_unmodified() {
        let fs = FakeFileSystem::new();
        fs.write(PATH, at(100), "");
        let mut source = QuerySource::new(PATH);
        source.is_modified(&fs).await.unwrap();

        assert!(!source.is_modified(&fs).await.unwrap());

        fs.touch(PATH, at(50));
        assert!(!source.is_modified(&fs).await.unwrap());
        assert_eq!(source.last_modified(), Some(at(100)));
    }

    #[tokio::test]
    async fn stat_failure_keeps_cached_time() {
        let fs = FakeFileSystem::new();
        fs.write(PATH, at(100), "");
        let mut source = QuerySource::new(PATH);
        source.is_modified(&fs).await.unwrap();

        fs.remove(PATH);
        assert!(source.is_modified(&fs).await.is_err());
        assert_eq!(source.last_modified(), Some(at(100)));

        fs.write(PATH, at(300), "");
        assert!(source.is_modified(&fs).await.unwrap());
    }

    #[tokio::test]
    async fn works_against_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.sql");
        std::fs::write(&path, "SELECT 1;").unwrap();

        let mut source = QuerySource::new(&path);
        assert!(!source
            .is_modified(&crate::core::fs::OsFileSystem)
            .await
            .unwrap());
        assert!(!source
            .is_modified(&crate::core::fs::OsFileSystem)
            .await
            .unwrap());
    }

    #[test]
    fn invalidate_requests_reload_and_keeps_metrics() {
        let mut source = QuerySource::new(PATH);
        source.set_metrics(vec!["a".into()]);

        source.invalidate();
        assert!(!source.is_loaded());
        assert_eq!(source.metrics().len(), 1);
    }

    #[test]
    fn set_metrics_marks_loaded() {
        let mut source = QuerySource::new(PATH);
        assert!(!source.is_loaded());

        source.set_metrics(vec!["a".into()]);
        assert!(source.is_loaded());
        assert_eq!(source.metrics(), ["a".to_string()]);
    }
}
