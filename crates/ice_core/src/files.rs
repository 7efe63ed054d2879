//! File-manager collaborator.
//!
//! The index reads source files directly; every *mutation* goes through a
//! [`FileManager`] so that the session can record an [`EditRecord`] and later
//! restore the prior content.
//!
//! [`EditRecord`]: crate::EditRecord

use crate::blob_store::{write_atomic, BlobStore};
use crate::content_hash::ContentHash;
use crate::error::{IceError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Content hashes on both sides of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Content before the mutation ([`ContentHash::ABSENT`] if the file did not exist).
    pub before: ContentHash,
    /// Content after the mutation ([`ContentHash::ABSENT`] if the file was deleted).
    pub after: ContentHash,
}

/// Reads, writes and restores workspace files.
pub trait FileManager: Send + Sync {
    /// Reads a workspace-relative file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Replaces (or creates) a file, returning the hashes around the change.
    fn write(&self, path: &str, content: &[u8]) -> Result<WriteOutcome>;

    /// Deletes a file, returning the hashes around the change.
    fn delete(&self, path: &str) -> Result<WriteOutcome>;

    /// Puts a file back to the content identified by `before`.
    ///
    /// [`ContentHash::ABSENT`] removes the file.
    fn restore(&self, path: &str, before: ContentHash) -> Result<()>;
}

/// [`FileManager`] over a directory tree, keeping every overwritten version in
/// a [`BlobStore`].
#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
    blobs: BlobStore,
}

impl WorkspaceFiles {
    /// Creates a file manager for `root`, backing content up into `blobs`.
    pub fn new(root: impl AsRef<Path>, blobs: BlobStore) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            blobs,
        }
    }

    /// Returns the workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a workspace-relative path to an absolute one, refusing escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.is_empty() || escapes {
            return Err(IceError::PathOutsideWorkspace(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Backs up the current content, returning its hash (ABSENT if missing).
    fn snapshot(&self, full: &Path) -> Result<ContentHash> {
        match fs::read(full) {
            Ok(bytes) => self.blobs.put(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ContentHash::ABSENT),
            Err(e) => Err(e.into()),
        }
    }
}

impl FileManager for WorkspaceFiles {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IceError::NotFound(path.to_string()),
            _ => e.into(),
        })
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<WriteOutcome> {
        let full = self.resolve(path)?;
        let before = self.snapshot(&full)?;
        let after = self.blobs.put(content)?;
        write_atomic(&full, content)?;
        debug!(path, before = %before.short(), after = %after.short(), "file written");
        Ok(WriteOutcome { before, after })
    }

    fn delete(&self, path: &str) -> Result<WriteOutcome> {
        let full = self.resolve(path)?;
        let before = self.snapshot(&full)?;
        if before.is_absent() {
            return Err(IceError::NotFound(path.to_string()));
        }
        fs::remove_file(&full)?;
        debug!(path, before = %before.short(), "file deleted");
        Ok(WriteOutcome {
            before,
            after: ContentHash::ABSENT,
        })
    }

    fn restore(&self, path: &str, before: ContentHash) -> Result<()> {
        let full = self.resolve(path)?;
        if before.is_absent() {
            match fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            let content = self.blobs.get(before)?;
            write_atomic(&full, &content)?;
        }
        debug!(path, to = %before.short(), "file restored");
        Ok(())
    }
}
