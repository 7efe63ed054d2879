//! Content hashing for files, backups, and cache keys.

use crate::error::{IceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE3 hash of raw file content.
///
/// The same bytes always produce the same hash, so a `ContentHash` doubles as
/// the key of the backup blob holding those bytes. The all-zero value is
/// reserved for "no content": an edit whose `before_hash` is
/// [`ContentHash::ABSENT`] created the file.
///
/// # Examples
///
/// ```
/// use ice_core::ContentHash;
///
/// let hash = ContentHash::of(b"print('hi')\n");
/// assert_eq!(hash.as_hex().len(), 64);
/// assert_eq!(ContentHash::from_hex(&hash.as_hex()).unwrap(), hash);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// The length of a ContentHash as a hex string.
    pub const HEX_LEN: usize = 64;

    /// Marker for content that did not exist.
    pub const ABSENT: ContentHash = ContentHash([0u8; 32]);

    /// Creates a ContentHash from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hashes raw content.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Returns a reference to the underlying digest.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns true for [`ContentHash::ABSENT`].
    pub fn is_absent(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Returns this hash as a lowercase hex string (always 64 characters).
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first 12 hex characters, for display.
    pub fn short(&self) -> String {
        self.as_hex()[..12].to_string()
    }

    /// Returns the shard prefix (first 2 hex characters).
    ///
    /// Used for directory sharding in the blob store:
    /// `.ice/objects/{shard}/{full_hex}`
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Parses a ContentHash from a hex string.
    ///
    /// # Errors
    ///
    /// Returns `IceError::InvalidHex` if the string is not valid hex
    /// or is not exactly 64 characters long.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::HEX_LEN {
            return Err(IceError::InvalidHex(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| IceError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IceError::InvalidHex("invalid length".to_string()))?;

        Ok(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", self.short())
    }
}

/// Incremental hasher for keys built from many parts (e.g. the cache key over
/// the tracked path set).
pub(crate) struct KeyHasher(blake3::Hasher);

impl KeyHasher {
    pub(crate) fn new(domain: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(&[0]);
        Self(hasher)
    }

    /// Adds one length-prefixed field so that ("ab","c") and ("a","bc") differ.
    pub(crate) fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    pub(crate) fn finish(&self) -> ContentHash {
        ContentHash(*self.0.finalize().as_bytes())
    }
}
