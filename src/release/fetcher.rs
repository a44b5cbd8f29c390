//! Fetch orchestration
//!
//! [`Fetcher`] owns the freshness/staleness state machine: consult the cache,
//! decide whether the entry is fresh enough to short-circuit, otherwise go to
//! the configured source of truth and fall back to an acceptably-stale cache
//! entry when that fails. Two thresholds govern every decision: TTL ("when do
//! I bother re-checking") and max-staleness ("how old is too old to ever
//! use"), with separate pairs for floating "latest" pointers and pinned tags.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::cache::CacheStore;
use super::error::SourceError;
use super::local::{is_local_path, LocalSource};
use super::manifest::Manifest;
use super::remote::RemoteSource;
use super::source::ManifestSource;
use super::version::normalize_version;

/// Default release repository
pub const DEFAULT_REPOSITORY: &str =
    "https://raw.githubusercontent.com/deckhand-dev/releases/main";

/// Fetcher configuration
///
/// Every field has a documented default; construct with `..Default::default()`
/// and override what the caller actually sets.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Repository location: an HTTPS base URL, or a filesystem path
    /// (starting with `/`, `.`, or `~`) for a local mirror
    pub repository: Option<String>,

    /// Cache directory; defaults to the platform cache dir
    pub cache_dir: Option<PathBuf>,

    /// Never touch the repository; serve from cache within max-staleness
    pub offline: bool,

    /// How long a cached "latest" resolution is considered fresh
    pub latest_ttl: Duration,

    /// Oldest "latest" entry ever served, even as a degraded fallback
    pub latest_max_stale: Duration,

    /// How long a cached pinned manifest is considered fresh
    pub pinned_ttl: Duration,

    /// Oldest pinned entry ever served
    pub pinned_max_stale: Duration,

    /// HTTP attempt budget per document
    pub retry_count: u32,

    /// Base backoff delay; attempt N sleeps `retry_delay * N`
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            repository: None,
            cache_dir: None,
            offline: false,
            latest_ttl: Duration::from_secs(15 * 60),
            latest_max_stale: Duration::from_secs(60 * 60),
            pinned_ttl: Duration::from_secs(24 * 60 * 60),
            pinned_max_stale: Duration::from_secs(7 * 24 * 60 * 60),
            retry_count: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl FetchOptions {
    fn resolved_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }

        directories::ProjectDirs::from("dev", "deckhand", "deckhand")
            .map(|dirs| dirs.cache_dir().join("manifests"))
            .or_else(|| dirs::cache_dir().map(|d| d.join("deckhand").join("manifests")))
            .context("Could not determine cache directory")
    }
}

/// Resolves (channel, version) pairs into release manifests
pub struct Fetcher {
    source: Box<dyn ManifestSource>,
    cache: CacheStore,
    offline: bool,
    latest_ttl: Duration,
    latest_max_stale: Duration,
    pinned_ttl: Duration,
    pinned_max_stale: Duration,

    // Per-key single-flight: concurrent callers for the same (channel,
    // version) serialize here, so the second caller hits the cache the first
    // one just wrote instead of racing it.
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl Fetcher {
    /// Create a fetcher from options
    ///
    /// The repository location selects the backend: filesystem paths get a
    /// [`LocalSource`], everything else a [`RemoteSource`].
    pub fn new(opts: FetchOptions) -> Result<Self> {
        let repository = opts
            .repository
            .clone()
            .unwrap_or_else(|| DEFAULT_REPOSITORY.to_string());

        let source: Box<dyn ManifestSource> = if is_local_path(&repository) {
            Box::new(LocalSource::new(&repository))
        } else {
            Box::new(RemoteSource::new(
                &repository,
                opts.retry_count,
                opts.retry_delay,
            )?)
        };

        let cache = CacheStore::new(opts.resolved_cache_dir()?)?;
        Ok(Self::with_source(source, cache, &opts))
    }

    /// Create a fetcher with an explicit source backend
    pub fn with_source(
        source: Box<dyn ManifestSource>,
        cache: CacheStore,
        opts: &FetchOptions,
    ) -> Self {
        Self {
            source,
            cache,
            offline: opts.offline,
            latest_ttl: opts.latest_ttl,
            latest_max_stale: opts.latest_max_stale,
            pinned_ttl: opts.pinned_ttl,
            pinned_max_stale: opts.pinned_max_stale,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The cache behind this fetcher
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Resolve a channel/version pair into a release manifest
    ///
    /// Empty channel defaults to "stable", empty version to "latest", and the
    /// version is normalized so "1.2.3" and "v1.2.3" share one cache entry.
    pub async fn fetch(&self, channel: &str, version: &str) -> Result<Manifest> {
        let channel = if channel.is_empty() { "stable" } else { channel };
        let version = normalize_version(version);

        let key_lock = self.key_lock(channel, &version).await;
        let guard = key_lock.lock().await;
        let result = self.fetch_locked(channel, &version).await;
        drop(guard);

        self.prune_key_lock(channel, &version).await;
        result
    }

    /// State machine body; runs with the per-key lock held
    async fn fetch_locked(&self, channel: &str, version: &str) -> Result<Manifest> {
        let (ttl, max_stale) = self.cache_policy(version);

        let cached = self.cache.load(channel, version);
        if let Some((manifest, fetched_at)) = &cached {
            let age = age_of(*fetched_at);
            if age <= ttl {
                tracing::debug!(
                    "Cache hit for {}/{} (age {:?} <= ttl {:?})",
                    channel,
                    version,
                    age,
                    ttl
                );
                return Ok(manifest.clone());
            }
            if self.offline && age <= max_stale {
                tracing::warn!(
                    "Offline: serving stale cached manifest for {}/{} (age {:?})",
                    channel,
                    version,
                    age
                );
                return Ok(manifest.clone());
            }
        }

        if self.offline {
            bail!("Offline and no usable cache for {}/{}", channel, version);
        }

        tracing::info!(
            "Fetching manifest {}/{} from {}",
            channel,
            version,
            self.source.location()
        );

        match self.source.fetch_manifest(channel, version).await {
            Ok(manifest) => {
                if let Err(err) = self.cache.save(channel, version, &manifest) {
                    // Caching is an optimization, not a correctness requirement
                    tracing::warn!("Failed to cache manifest {}/{}: {}", channel, version, err);
                }
                Ok(manifest)
            }
            Err(err) => {
                // Malformed content is not eligible for substitution: the
                // repository is reachable but publishing unusable data, and
                // serving an old manifest instead would hide that.
                let fallback_eligible = !matches!(err, SourceError::Parse { .. });
                if fallback_eligible {
                    if let Some((manifest, fetched_at)) = cached {
                        if age_of(fetched_at) <= max_stale {
                            tracing::warn!(
                                "Using stale cached manifest for {}/{} after fetch failure: {}",
                                channel,
                                version,
                                err
                            );
                            return Ok(manifest);
                        }
                    }
                }
                Err(err).with_context(|| {
                    format!(
                        "Failed to fetch manifest {}/{} from {}",
                        channel,
                        version,
                        self.source.location()
                    )
                })
            }
        }
    }

    /// TTL and max-staleness for a normalized version
    ///
    /// "latest" is a pointer that moves, so it gets the short thresholds;
    /// pinned tags are expected to be immutable once published.
    fn cache_policy(&self, version: &str) -> (Duration, Duration) {
        if version == "latest" {
            (self.latest_ttl, self.latest_max_stale)
        } else {
            (self.pinned_ttl, self.pinned_max_stale)
        }
    }

    async fn key_lock(&self, channel: &str, version: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((channel.to_string(), version.to_string()))
            .or_default()
            .clone()
    }

    /// Drop a key's lock entry once no caller references it
    ///
    /// Cloning an entry requires the map lock, so while we hold it the only
    /// references are the map's own and the caller's: a strong count above
    /// two means another task is waiting on this key and the entry stays.
    async fn prune_key_lock(&self, channel: &str, version: &str) {
        let key = (channel.to_string(), version.to_string());
        let mut locks = self.locks.lock().await;
        if locks.get(&key).map(Arc::strong_count) == Some(2) {
            locks.remove(&key);
        }
    }

    /// Number of live per-key lock entries (test hook)
    #[cfg(test)]
    pub(super) async fn key_lock_entries(&self) -> usize {
        self.locks.lock().await.len()
    }
}

fn age_of(fetched_at: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(fetched_at)
        .to_std()
        .unwrap_or_default()
}
