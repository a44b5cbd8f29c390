//! Release manifest parsing (releases/{version}.yaml)
//!
//! The manifest is the platform release descriptor: which container images,
//! native binaries, and infrastructure versions constitute a release. It also
//! defines the derived [`ServiceInfo`] view that provisioning code uses to
//! locate the artifact for one named service.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A platform release manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Platform version tag (e.g., "v1.2.3")
    #[serde(default)]
    pub platform_version: String,

    /// Source-control revision the release was cut from
    #[serde(default)]
    pub revision: String,

    /// When the release was published
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,

    /// Containerized platform services
    #[serde(default)]
    pub services: Vec<ServiceEntry>,

    /// Native binary artifacts, per architecture
    #[serde(default)]
    pub native_binaries: Vec<NativeBinary>,

    /// UI / front-end services
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,

    /// Third-party infrastructure dependencies
    #[serde(default)]
    pub infrastructure: Vec<InfrastructureEntry>,

    /// Dependencies that don't fit the other shapes
    #[serde(default)]
    pub external_dependencies: Vec<ExternalDependency>,
}

/// A containerized platform service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Unique service name within the manifest
    pub name: String,

    /// Service-specific version (may differ from the platform version)
    #[serde(default)]
    pub service_version: String,

    /// Container image reference (without digest)
    #[serde(default)]
    pub image: String,

    /// Content digest (e.g., "sha256:...")
    #[serde(default)]
    pub digest: String,
}

/// A native binary with per-architecture artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeBinary {
    /// Unique binary name within the manifest
    pub name: String,

    /// One artifact per supported architecture
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// A single downloadable artifact for one architecture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifact {
    /// Architecture tag (e.g., "linux-amd64")
    pub arch: String,

    /// Bare filename; the caller constructs the download location
    #[serde(default)]
    pub file: String,

    /// Direct download URL, preferred over `file` when set
    #[serde(default)]
    pub url: String,
}

/// A UI / front-end service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceEntry {
    /// Unique interface name
    pub name: String,

    /// Container image reference
    #[serde(default)]
    pub image: String,

    /// Content digest
    #[serde(default)]
    pub digest: String,

    /// Optional static-bundle reference for CDN deployment
    #[serde(default)]
    pub static_bundle: Option<String>,
}

/// A third-party infrastructure dependency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureEntry {
    /// Dependency name (e.g., "postgresql")
    pub name: String,

    /// Tested / minimum version
    #[serde(default)]
    pub tested_version: String,

    /// Container image, when the platform runs it
    #[serde(default)]
    pub image: String,

    /// Free-text operator notes
    #[serde(default)]
    pub notes: String,
}

/// A dependency that doesn't fit the other shapes
///
/// Unrecognized fields are preserved in the open attribute bag rather than
/// rejected, so manifests can carry forward-compatible metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalDependency {
    /// Dependency name
    pub name: String,

    /// Open attribute bag
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_yaml_ng::Value>,
}

/// A channel pointer (channels/{channel}.yaml)
///
/// Indirection record used only for "latest": it names the concrete release
/// manifest a channel currently designates, so "latest" can be repointed
/// without rewriting or renaming manifest files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPointer {
    /// Platform version label the channel currently points at
    #[serde(default)]
    pub platform_version: String,

    /// Path to the release manifest, relative to the repository root
    /// (e.g., "releases/v0.1.0-rc2.yaml")
    #[serde(default)]
    pub manifest: String,

    /// When the pointer was last moved
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Resolved artifact locations for one named service
///
/// Derived from a [`Manifest`] on demand and never persisted; provisioning
/// code uses it to locate the image or binary for a service.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name as it appears in the manifest
    pub name: String,

    /// Service version (empty for interface-only entries)
    pub version: String,

    /// Container image reference
    pub image: String,

    /// Content digest
    pub digest: String,

    /// Composed "image@digest" reference
    pub full_image: String,

    /// "{os}-{arch}" → download URL or bare filename
    pub binaries: HashMap<String, String>,
}

impl Manifest {
    /// Parse a manifest from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Invalid manifest YAML")
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to serialize manifest")
    }

    /// Look up artifact locations for a named service
    ///
    /// Searches `services`, then `interfaces`, then `native_binaries` (for
    /// binary-only services with no image entry); the first match wins.
    pub fn get_service_info(&self, service_name: &str) -> Result<ServiceInfo> {
        if let Some(svc) = self.services.iter().find(|s| s.name == service_name) {
            let mut info = ServiceInfo {
                name: svc.name.clone(),
                version: svc.service_version.clone(),
                image: svc.image.clone(),
                digest: svc.digest.clone(),
                full_image: format!("{}@{}", svc.image, svc.digest),
                binaries: HashMap::new(),
            };
            self.populate_binaries(&mut info);
            return Ok(info);
        }

        if let Some(iface) = self.interfaces.iter().find(|i| i.name == service_name) {
            return Ok(ServiceInfo {
                name: iface.name.clone(),
                version: String::new(),
                image: iface.image.clone(),
                digest: iface.digest.clone(),
                full_image: format!("{}@{}", iface.image, iface.digest),
                binaries: HashMap::new(),
            });
        }

        if let Some(nb) = self.native_binaries.iter().find(|b| b.name == service_name) {
            let mut info = ServiceInfo {
                name: nb.name.clone(),
                version: String::new(),
                image: String::new(),
                digest: String::new(),
                full_image: String::new(),
                binaries: HashMap::new(),
            };
            self.populate_binaries(&mut info);
            return Ok(info);
        }

        bail!("Service '{}' not found in manifest", service_name)
    }

    /// Fill `info.binaries` from `native_binaries`, preferring an artifact's
    /// direct URL over its bare filename.
    fn populate_binaries(&self, info: &mut ServiceInfo) {
        if let Some(nb) = self.native_binaries.iter().find(|b| b.name == info.name) {
            for artifact in &nb.artifacts {
                let location = if artifact.url.is_empty() {
                    artifact.file.clone()
                } else {
                    artifact.url.clone()
                };
                info.binaries.insert(artifact.arch.clone(), location);
            }
        }
    }
}

impl ServiceInfo {
    /// Download URL (or bare filename) for the binary matching `os` and `arch`
    pub fn get_binary_url(&self, os: &str, arch: &str) -> Result<&str> {
        let key = format!("{os}-{arch}");
        self.binaries
            .get(&key)
            .map(String::as_str)
            .with_context(|| format!("Binary not available for {key}"))
    }
}
