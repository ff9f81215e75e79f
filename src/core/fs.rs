//! Filesystem access used by the change detector and the parser.
//!
//! Query files are only ever stat'ed and read as text. Both operations go
//! through the [`FileSystem`] trait so the refresh cycle can run against an
//! in-memory filesystem in tests.

use std::{io, path::Path, time::SystemTime};

#[async_trait::async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Last modification time of the file at `path`.
    async fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Full contents of the file at `path`.
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The real filesystem, backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

#[async_trait::async_trait]
impl FileSystem for OsFileSystem {
    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}
