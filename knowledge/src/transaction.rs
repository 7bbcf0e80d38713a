//! Multi-file stage-then-swap writes.
//!
//! A transaction first writes every changed file next to its destination as
//! `<name>.tmp`, then renames the staged files into place in staging order.
//! Any failure removes whatever was staged and puts back the original bytes
//! of files that were already swapped, leaving the directory as it was.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{Result, StorageError};
use crate::fs::CodexFs;

/// Files changed by a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
}

struct PendingWrite {
    path: PathBuf,
    staged: PathBuf,
    contents: Vec<u8>,
    original: Option<Vec<u8>>,
}

/// A set of whole-file writes applied all together or not at all.
#[derive(Debug, Default)]
pub struct Transaction {
    writes: Vec<(PathBuf, Vec<u8>)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `contents` for `path`. Staging the same path twice keeps the
    /// later contents.
    pub fn stage(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let contents = contents.into();
        match self.writes.iter_mut().find(|(p, _)| *p == path) {
            Some(existing) => existing.1 = contents,
            None => self.writes.push((path, contents)),
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every staged write.
    pub async fn commit(self, fs: &dyn CodexFs) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();
        let mut pending = Vec::new();

        for (path, contents) in self.writes {
            let original = fs
                .read(&path)
                .await
                .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;
            if original.as_deref() == Some(contents.as_slice()) {
                summary.unchanged += 1;
                continue;
            }
            pending.push(PendingWrite {
                staged: staged_path(&path),
                path,
                contents,
                original,
            });
        }

        for (i, write) in pending.iter().enumerate() {
            if let Err(e) = fs.write(&write.staged, &write.contents).await {
                warn!("Staging {} failed, discarding staged files", write.staged.display());
                discard(fs, &pending[..=i]).await;
                return Err(
                    StorageError::WriteFile(format!("{}: {e}", write.staged.display())).into(),
                );
            }
            debug!("Staged {}", write.staged.display());
        }

        for (i, write) in pending.iter().enumerate() {
            if let Err(e) = fs.rename(&write.staged, &write.path).await {
                warn!("Swapping {} failed, rolling back", write.path.display());
                restore(fs, &pending[..i]).await;
                discard(fs, &pending[i..]).await;
                return Err(StorageError::Rename(format!("{}: {e}", write.path.display())).into());
            }
        }

        summary.written = pending.into_iter().map(|w| w.path).collect();
        Ok(summary)
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn discard(fs: &dyn CodexFs, writes: &[PendingWrite]) {
    for write in writes {
        if let Err(e) = fs.remove(&write.staged).await {
            error!("Failed to discard {}: {e}", write.staged.display());
        }
    }
}

async fn restore(fs: &dyn CodexFs, writes: &[PendingWrite]) {
    for write in writes.iter().rev() {
        let outcome = match &write.original {
            Some(bytes) => fs.write(&write.path, bytes).await,
            None => fs.remove(&write.path).await,
        };
        if let Err(e) = outcome {
            error!("Failed to restore {}: {e}", write.path.display());
        }
    }
}
