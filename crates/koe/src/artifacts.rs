//! Content-addressed storage for generated MIDI files.
//!
//! Layout:
//! ```text
//! {artifact_dir}/
//! ├── ab/
//! │   └── cde123...   # remainder of the hash
//! └── 12/
//!     └── 3456789...
//! ```

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// BLAKE3 hash of an artifact, truncated to 128 bits (32 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

#[derive(Debug, Error)]
pub enum ArtifactIdError {
    #[error("invalid artifact id length: expected 32 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in artifact id")]
    InvalidHex,
}

impl ArtifactId {
    pub fn from_data(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(hex::encode(&hash.as_bytes()[..16]))
    }

    /// First two characters, used as the shard directory.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    pub fn remainder(&self) -> &str {
        &self.0[2..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Where clients fetch this artifact.
    pub fn download_url(&self) -> String {
        format!("/download-midi/{}", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArtifactId {
    type Err = ArtifactIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(ArtifactIdError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ArtifactIdError::InvalidHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

/// Storage for finished artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Store bytes and return their id. Storing existing content is a no-op.
    fn store(&self, data: &[u8]) -> Result<ArtifactId>;

    /// `Ok(None)` if nothing is stored under `id`.
    fn retrieve(&self, id: &ArtifactId) -> Result<Option<Vec<u8>>>;

    /// Filesystem location of a stored artifact, if it exists.
    fn path(&self, id: &ArtifactId) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create artifact directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn object_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.prefix()).join(id.remainder())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn store(&self, data: &[u8]) -> Result<ArtifactId> {
        let id = ArtifactId::from_data(data);
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }

        let shard = self.root.join(id.prefix());
        fs::create_dir_all(&shard).context("failed to create artifact shard directory")?;

        // Readers never see a partial file
        let mut staged = tempfile::NamedTempFile::new_in(&shard)
            .context("failed to create staging file")?;
        staged.write_all(data).context("failed to write artifact")?;
        staged
            .persist(&path)
            .map_err(|e| e.error)
            .context("failed to move artifact into place")?;

        tracing::debug!(artifact = %id, bytes = data.len(), "stored artifact");
        Ok(id)
    }

    fn retrieve(&self, id: &ArtifactId) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(id);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn path(&self, id: &ArtifactId) -> Option<PathBuf> {
        let path = self.object_path(id);
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_32_hex_chars() {
        let id = ArtifactId::from_data(b"MThd");
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(format!("{}{}", id.prefix(), id.remainder()), id.as_str());
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        assert!(matches!(
            "abc".parse::<ArtifactId>(),
            Err(ArtifactIdError::InvalidLength(3))
        ));
        assert!(matches!(
            "zz".repeat(16).parse::<ArtifactId>(),
            Err(ArtifactIdError::InvalidHex)
        ));
        let upper = ArtifactId::from_data(b"x").as_str().to_ascii_uppercase();
        assert_eq!(upper.parse::<ArtifactId>().unwrap(), ArtifactId::from_data(b"x"));
    }

    #[test]
    fn test_store_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        let id = store.store(b"midi bytes").unwrap();
        assert_eq!(store.retrieve(&id).unwrap().as_deref(), Some(&b"midi bytes"[..]));

        let path = store.path(&id).unwrap();
        assert!(path.starts_with(dir.path().join(id.prefix())));
        assert_eq!(id.download_url(), format!("/download-midi/{}", id));
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();

        let a = store.store(b"same").unwrap();
        let b = store.store(b"same").unwrap();
        assert_eq!(a, b);

        let shard = fs::read_dir(dir.path().join(a.prefix())).unwrap().count();
        assert_eq!(shard, 1);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactId::from_data(b"never stored");
        assert!(store.retrieve(&id).unwrap().is_none());
        assert!(store.path(&id).is_none());
    }
}
