//! Release manifest resolution
//!
//! This module resolves a deployment channel/version pair into a concrete
//! release manifest describing which container images, native binaries, and
//! infrastructure versions make up a platform release.
//!
//! # Overview
//!
//! Resolution consults a local cache first and falls back to the configured
//! repository, which may be a remote HTTPS endpoint or a checkout on disk:
//!
//! ```text
//! Repository (HTTPS or local path)
//!     │
//!     ├── channels/{channel}.yaml  ← Pointer to the current release
//!     └── releases/{version}.yaml  ← Pinned release manifests
//!            │
//!            ▼
//!     Fetcher (TTL / max-staleness policy)
//!            │
//!            ▼
//!     {cache}/{channel}/{version}.yaml      ← Cached manifest
//!     {cache}/{channel}/{version}.meta.json ← Fetch timestamp
//! ```
//!
//! "latest" is a floating pointer that can be repointed between releases, so
//! it is cached on a short leash; pinned tags are expected to be immutable
//! once published and are cached far more aggressively.

mod cache;
mod error;
mod fetcher;
mod local;
mod manifest;
mod remote;
mod source;
mod version;

pub use cache::CacheStore;
pub use error::SourceError;
pub use fetcher::{FetchOptions, Fetcher, DEFAULT_REPOSITORY};
pub use local::LocalSource;
pub use manifest::{
    Artifact, ChannelPointer, ExternalDependency, InfrastructureEntry, InterfaceEntry, Manifest,
    NativeBinary, ServiceEntry, ServiceInfo,
};
pub use remote::RemoteSource;
pub use source::ManifestSource;
pub use version::{normalize_version, resolve_version};
