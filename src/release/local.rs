//! Local repository source
//!
//! Same contract as [`super::RemoteSource`] but reads a repository checkout
//! on disk, for air-gapped installs and development against a local mirror.
//! Local I/O failures are not assumed transient, so nothing here retries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::SourceError;
use super::manifest::{ChannelPointer, Manifest};
use super::source::ManifestSource;

/// Filesystem backend for a repository mirror checked out on disk
pub struct LocalSource {
    repository: String,
    root: PathBuf,
}

/// Whether a repository location is a filesystem path rather than a URL
///
/// Disambiguated syntactically: paths start with `/`, `.`, or `~`.
pub(super) fn is_local_path(location: &str) -> bool {
    location.starts_with('/') || location.starts_with('.') || location.starts_with('~')
}

impl LocalSource {
    /// Create a source rooted at a repository checkout
    pub fn new(repository: &str) -> Self {
        let root = match repository.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(rest),
            None => PathBuf::from(repository),
        };

        Self {
            repository: repository.to_string(),
            root,
        }
    }

    fn read_manifest(&self, path: &Path) -> Result<Manifest, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml_ng::from_str(&content).map_err(|source| SourceError::Parse {
            what: "manifest",
            location: path.display().to_string(),
            source,
        })
    }

    /// Resolve "latest" to a manifest path
    ///
    /// Prefers the channel pointer file. When the pointer is missing or
    /// unparsable, falls back to scanning `releases/` and taking the
    /// lexicographically greatest `.yaml` filename. The scan is a filename
    /// sort, not a semantic-version comparison ("v10.0.0" sorts before
    /// "v2.0.0"); repositories that rely on the fallback should keep release
    /// filenames zero-padded or lean on the pointer file.
    fn resolve_latest(&self, channel: &str) -> Result<PathBuf, SourceError> {
        let pointer_path = self.root.join("channels").join(format!("{channel}.yaml"));
        if let Ok(content) = std::fs::read_to_string(&pointer_path) {
            match serde_yaml_ng::from_str::<ChannelPointer>(&content) {
                Ok(pointer) if !pointer.manifest.is_empty() => {
                    return Ok(self.root.join(pointer.manifest));
                }
                Ok(_) => {
                    tracing::debug!(
                        "Channel pointer {} has no manifest path, scanning releases",
                        pointer_path.display()
                    );
                }
                Err(err) => {
                    tracing::debug!(
                        "Unparsable channel pointer {}: {}, scanning releases",
                        pointer_path.display(),
                        err
                    );
                }
            }
        }

        let releases_dir = self.root.join("releases");
        let entries = std::fs::read_dir(&releases_dir).map_err(|source| SourceError::Io {
            path: releases_dir.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".yaml"))
            .collect();
        names.sort();

        match names.last() {
            Some(name) => Ok(releases_dir.join(name)),
            None => Err(SourceError::NoReleases { dir: releases_dir }),
        }
    }
}

#[async_trait]
impl ManifestSource for LocalSource {
    async fn fetch_manifest(&self, channel: &str, version: &str) -> Result<Manifest, SourceError> {
        let manifest_path = if version == "latest" {
            self.resolve_latest(channel)?
        } else {
            self.root.join("releases").join(format!("{version}.yaml"))
        };

        tracing::debug!("Reading manifest from {}", manifest_path.display());
        self.read_manifest(&manifest_path)
    }

    fn location(&self) -> &str {
        &self.repository
    }
}
