//! Filesystem access used by the codex.
//!
//! All reads and writes go through [`CodexFs`] so the storage layer can be
//! exercised against injected failures.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

/// Minimal async filesystem surface.
#[async_trait]
pub trait CodexFs: Send + Sync {
    /// Read a file, returning `None` if it does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file. Missing files are not an error.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`CodexFs`] over the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl CodexFs for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs;
        assert_eq!(fs.read(&temp_dir.path().join("nope.md")).await.unwrap(), None);
        fs.remove(&temp_dir.path().join("nope.md")).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_rename_read() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs;
        let tmp = temp_dir.path().join("a.md.tmp");
        let dst = temp_dir.path().join("a.md");
        fs.write(&tmp, b"hello").await.unwrap();
        fs.rename(&tmp, &dst).await.unwrap();

        assert_eq!(fs.read(&dst).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(fs.read(&tmp).await.unwrap(), None);
    }
}
