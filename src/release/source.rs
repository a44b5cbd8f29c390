//! Source of truth abstraction
//!
//! The orchestrator talks to the repository through this trait so that the
//! remote (HTTP) and local (filesystem) backends are interchangeable, and so
//! tests can substitute stubs.

use async_trait::async_trait;

use super::error::SourceError;
use super::manifest::Manifest;

/// A repository backend that can produce release manifests
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the manifest for a channel/version pair
    ///
    /// `version` is already normalized; "latest" resolves through the channel
    /// pointer, anything else addresses `releases/{version}.yaml` directly.
    async fn fetch_manifest(&self, channel: &str, version: &str) -> Result<Manifest, SourceError>;

    /// Human-readable repository location, for error context and logs
    fn location(&self) -> &str;
}
