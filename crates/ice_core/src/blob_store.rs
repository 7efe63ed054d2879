//! Content-addressed backup storage for file contents.
//!
//! Every version of a file that a session mutates is kept here under its
//! [`ContentHash`], so an undo can restore the exact bytes that preceded an
//! edit.

use crate::content_hash::ContentHash;
use crate::error::{IceError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum size of one stored blob (100 MB).
const MAX_BLOB_SIZE: usize = 100 * 1024 * 1024;

/// Envelope magic: `ICEBLOB` plus a format byte.
const MAGIC: &[u8; 8] = b"ICEBLOB\x01";

/// Envelope header length: magic + u64 LE payload length.
const HEADER_LEN: usize = MAGIC.len() + 8;

/// Content-addressed blob storage.
///
/// Blobs are stored zstd-compressed under `{root}/{shard}/{hex}` and verified
/// against their hash on every read.
///
/// # Examples
///
/// ```
/// use ice_core::BlobStore;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = BlobStore::new(tmp.path().join("objects"), 3);
///
/// let hash = store.put(b"hello world").unwrap();
/// assert_eq!(store.get(hash).unwrap(), b"hello world");
/// ```
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    compression_level: i32,
}

impl BlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl AsRef<Path>, compression_level: i32) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            compression_level,
        }
    }

    /// Returns the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `data` and returns its hash. Storing existing content is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `BlobTooLarge` above the size limit, or an I/O error.
    pub fn put(&self, data: &[u8]) -> Result<ContentHash> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(IceError::BlobTooLarge {
                size: data.len(),
                limit: MAX_BLOB_SIZE,
            });
        }

        let hash = ContentHash::of(data);
        if self.exists(hash) {
            return Ok(hash);
        }

        let mut envelope = Vec::with_capacity(HEADER_LEN + data.len());
        envelope.extend_from_slice(MAGIC);
        envelope.extend_from_slice(&(data.len() as u64).to_le_bytes());
        envelope.extend_from_slice(data);

        let compressed = zstd::encode_all(envelope.as_slice(), self.compression_level)
            .map_err(|e| IceError::Compression(e.to_string()))?;
        write_atomic(&self.blob_path(hash), &compressed)?;
        Ok(hash)
    }

    /// Reads the blob stored under `hash`, verifying its integrity.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` if it was never stored and `CorruptedBlob` if the
    /// stored bytes no longer match the hash.
    pub fn get(&self, hash: ContentHash) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Err(IceError::BlobNotFound(hash.as_hex()));
        }

        let compressed = fs::read(&path)?;
        let envelope = zstd::decode_all(compressed.as_slice()).map_err(|e| IceError::CorruptedBlob {
            path: path.clone(),
            reason: format!("decompression failed: {}", e),
        })?;

        if envelope.len() < HEADER_LEN || &envelope[..MAGIC.len()] != MAGIC {
            return Err(IceError::CorruptedBlob {
                path,
                reason: "invalid envelope header".to_string(),
            });
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&envelope[MAGIC.len()..HEADER_LEN]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        let payload = &envelope[HEADER_LEN..];
        if payload.len() != len {
            return Err(IceError::CorruptedBlob {
                path,
                reason: format!("length mismatch: header says {}, got {}", len, payload.len()),
            });
        }

        let actual = ContentHash::of(payload);
        if actual != hash {
            return Err(IceError::CorruptedBlob {
                path,
                reason: format!("hash mismatch: stored as {}, content is {}", hash.short(), actual.short()),
            });
        }

        Ok(payload.to_vec())
    }

    /// Whether a blob is stored under `hash`.
    pub fn exists(&self, hash: ContentHash) -> bool {
        self.blob_path(hash).exists()
    }

    fn blob_path(&self, hash: ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.as_hex())
    }
}

/// Writes `bytes` to `path` via temp file + fsync + rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| IceError::NotFound(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }

    Ok(())
}
