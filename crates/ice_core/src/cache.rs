//! On-disk cache of the codebase index.
//!
//! Layout of `.ice/index.cache`:
//!
//! ```text
//! magic      8 bytes   "ICEIDX\0\0"
//! schema     u32 LE    SCHEMA_VERSION
//! key        32 bytes  BLAKE3 over the sorted (path, content hash) pairs
//! body       ...       zstd(postcard(CodebaseIndex))
//! ```
//!
//! Loading fails soft: a missing, foreign, older-schema, corrupted or stale
//! cache is reported as [`IceError::IndexCacheInvalid`] and answered with a
//! full build. Only being unable both to load and to write the cache is
//! escalated, as [`IceError::CacheUnavailable`].

use crate::blob_store::write_atomic;
use crate::config::IndexConfig;
use crate::content_hash::{ContentHash, KeyHasher};
use crate::error::{IceError, Result};
use crate::index::{scan, CodebaseIndex};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAGIC: &[u8; 8] = b"ICEIDX\0\0";

/// Bumped whenever the serialized snapshot layout changes.
pub const SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4 + 32;

/// How [`IndexCache::load_or_build`] obtained its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The cache matched the tree and was used as is.
    Loaded,
    /// The cache was unusable; the index was rebuilt.
    Rebuilt {
        /// Why the cache was rejected.
        reason: String,
    },
}

/// Reader/writer for one cache file.
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    compression_level: i32,
}

impl IndexCache {
    pub fn new(path: impl AsRef<Path>, compression_level: i32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compression_level,
        }
    }

    /// Cache location inside an `.ice` directory, as configured.
    pub fn in_dir(ice_dir: &Path, config: &IndexConfig) -> Self {
        Self::new(ice_dir.join(&config.cache_file), config.compression_level)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key of a snapshot: a hash over its tracked paths and content hashes.
    pub fn key_of(index: &CodebaseIndex) -> ContentHash {
        tracked_key(index.tracked())
    }

    /// Key of the tree as it currently is on disk.
    pub fn key_of_tree(root: &Path, config: &IndexConfig) -> ContentHash {
        let hashed: Vec<(String, ContentHash)> = scan(root, config)
            .into_iter()
            .filter_map(|rel| {
                let bytes = fs::read(root.join(&rel)).ok()?;
                Some((rel, ContentHash::of(&bytes)))
            })
            .collect();
        tracked_key(hashed.iter().map(|(p, h)| (p.as_str(), *h)))
    }

    /// Writes `index` atomically under an exclusive lock.
    ///
    /// # Errors
    ///
    /// Any failure is reported as `CacheUnavailable`.
    pub fn persist(&self, index: &CodebaseIndex) -> Result<()> {
        let unavailable = |reason: String| IceError::CacheUnavailable {
            path: self.path.clone(),
            reason,
        };

        let body = postcard::to_allocvec(index).map_err(|e| unavailable(format!("serialize: {}", e)))?;
        let compressed = zstd::encode_all(body.as_slice(), self.compression_level)
            .map_err(|e| unavailable(format!("compress: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        bytes.extend_from_slice(Self::key_of(index).as_bytes());
        bytes.extend_from_slice(&compressed);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| unavailable(e.to_string()))?;
        }
        let lock = File::create(self.path.with_extension("lock")).map_err(|e| unavailable(e.to_string()))?;
        lock.lock_exclusive().map_err(|e| unavailable(format!("lock: {}", e)))?;
        let written = write_atomic(&self.path, &bytes);
        let _ = lock.unlock();
        written.map_err(|e| unavailable(e.to_string()))?;

        info!(path = %self.path.display(), version = index.version(), bytes = bytes.len(), "index cache written");
        Ok(())
    }

    /// Reads the cached snapshot and the key it was stored under.
    ///
    /// # Errors
    ///
    /// Every failure is reported as `IndexCacheInvalid`.
    pub fn load(&self) -> Result<(CodebaseIndex, ContentHash)> {
        let invalid = |reason: String| IceError::IndexCacheInvalid { reason };

        let bytes = fs::read(&self.path).map_err(|e| invalid(format!("cannot read {}: {}", self.path.display(), e)))?;
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(invalid("not an index cache".to_string()));
        }

        let mut schema = [0u8; 4];
        schema.copy_from_slice(&bytes[MAGIC.len()..MAGIC.len() + 4]);
        let schema = u32::from_le_bytes(schema);
        if schema != SCHEMA_VERSION {
            return Err(invalid(format!(
                "schema version {} (expected {})",
                schema, SCHEMA_VERSION
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[MAGIC.len() + 4..HEADER_LEN]);
        let key = ContentHash::from_bytes(key);

        let body = zstd::decode_all(&bytes[HEADER_LEN..]).map_err(|e| invalid(format!("decompress: {}", e)))?;
        let index: CodebaseIndex = postcard::from_bytes(&body).map_err(|e| invalid(format!("decode: {}", e)))?;

        if Self::key_of(&index) != key {
            return Err(invalid("key does not match cached content".to_string()));
        }
        Ok((index, key))
    }

    /// Loads the cache if it still matches the tree, otherwise rebuilds and
    /// rewrites it.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` only when the cache could neither be read
    /// nor written.
    pub fn load_or_build(&self, root: &Path, config: &IndexConfig) -> Result<(CodebaseIndex, LoadOutcome)> {
        let (rebuilt, reason, loadable) = match self.load() {
            Ok((cached, key)) => {
                if key == Self::key_of_tree(root, config) {
                    info!(version = cached.version(), files = cached.len(), "index loaded from cache");
                    return Ok((cached, LoadOutcome::Loaded));
                }
                let err = IceError::IndexCacheInvalid {
                    reason: "tracked files changed".to_string(),
                };
                warn!("{}", err);
                (cached.rebuild(root, config)?, err.to_string(), true)
            }
            Err(err) => {
                warn!("{}", err);
                (CodebaseIndex::build(root, config)?, err.to_string(), false)
            }
        };

        match self.persist(&rebuilt) {
            Ok(()) => {}
            Err(err) if loadable => warn!("{}", err),
            Err(err) => return Err(err),
        }
        Ok((rebuilt, LoadOutcome::Rebuilt { reason }))
    }
}

fn tracked_key<'a>(tracked: impl Iterator<Item = (&'a str, ContentHash)>) -> ContentHash {
    let mut hasher = KeyHasher::new("ice-index-cache");
    for (path, hash) in tracked {
        hasher.field(path.as_bytes()).field(hash.as_bytes());
    }
    hasher.finish()
}
