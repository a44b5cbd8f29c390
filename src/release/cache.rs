//! On-disk manifest cache
//!
//! One subdirectory per channel, one file per version:
//! `{root}/{channel}/{version}.yaml` holds the manifest and
//! `{root}/{channel}/{version}.meta.json` holds the fetch timestamp.
//! Both are written via a temporary file and an atomic rename so a concurrent
//! reader never observes a torn file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::manifest::Manifest;

/// Sidecar metadata next to each cached manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMetadata {
    /// When the manifest was fetched from its source of truth (RFC3339)
    fetched_at: DateTime<Utc>,
}

/// Manifest cache keyed by (channel, version)
///
/// Versions must be normalized before they reach the store; "1.2.3" and
/// "v1.2.3" are the same release and must address the same entry.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open a cache rooted at a directory, creating it if needed
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self { root })
    }

    /// Cache directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest and sidecar paths for a cache key
    pub fn entry_paths(&self, channel: &str, version: &str) -> (PathBuf, PathBuf) {
        let channel_dir = self.root.join(channel);
        (
            channel_dir.join(format!("{version}.yaml")),
            channel_dir.join(format!("{version}.meta.json")),
        )
    }

    /// Load a cached manifest and its fetch timestamp
    ///
    /// Returns `None` on a miss: the manifest file is absent or unparsable
    /// (the sidecar is not consulted in that case). A missing or unparsable
    /// sidecar degrades to the manifest file's mtime, and to the epoch when
    /// even that is unavailable, which reads as maximally stale.
    pub fn load(&self, channel: &str, version: &str) -> Option<(Manifest, DateTime<Utc>)> {
        let (manifest_path, meta_path) = self.entry_paths(channel, version);

        let content = std::fs::read_to_string(&manifest_path).ok()?;
        let manifest = match Manifest::from_yaml(&content) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::debug!(
                    "Discarding unparsable cache entry {}: {}",
                    manifest_path.display(),
                    err
                );
                return None;
            }
        };

        let fetched_at = Self::read_metadata(&meta_path)
            .or_else(|| Self::file_mtime(&manifest_path))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Some((manifest, fetched_at))
    }

    /// Persist a manifest and record the fetch time
    pub fn save(&self, channel: &str, version: &str, manifest: &Manifest) -> Result<()> {
        let channel_dir = self.root.join(channel);
        std::fs::create_dir_all(&channel_dir).with_context(|| {
            format!("Failed to create cache directory: {}", channel_dir.display())
        })?;

        let (manifest_path, meta_path) = self.entry_paths(channel, version);

        let yaml = manifest.to_yaml()?;
        Self::write_atomic(&channel_dir, &manifest_path, yaml.as_bytes())?;

        let meta = CacheMetadata {
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_vec(&meta).context("Failed to serialize cache metadata")?;
        Self::write_atomic(&channel_dir, &meta_path, &json)?;

        tracing::debug!("Cached {}/{} at {}", channel, version, manifest_path.display());
        Ok(())
    }

    /// Remove every cached entry
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read cache directory: {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to clear cache entry: {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Write via a temp file in the same directory, then rename into place
    fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        std::io::Write::write_all(&mut tmp, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn read_metadata(path: &Path) -> Option<DateTime<Utc>> {
        let content = std::fs::read_to_string(path).ok()?;
        let meta: CacheMetadata = serde_json::from_str(&content).ok()?;
        Some(meta.fetched_at)
    }

    fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Backdate an entry's fetch timestamp (test hook for staleness cases)
    #[cfg(test)]
    pub(super) fn set_fetched_at(
        &self,
        channel: &str,
        version: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let (_, meta_path) = self.entry_paths(channel, version);
        let json = serde_json::to_vec(&CacheMetadata { fetched_at })?;
        std::fs::write(meta_path, json)?;
        Ok(())
    }
}
