//! Remote repository source
//!
//! Retrieves manifests over HTTPS from a raw-file repository layout:
//! `channels/{channel}.yaml` for the floating pointer, `releases/{version}.yaml`
//! for pinned manifests. Every retrieval goes through one retry routine with
//! linear backoff (`base_delay * attempt`); only transient failures are
//! retried.

use std::time::Duration;

use async_trait::async_trait;

use super::error::SourceError;
use super::manifest::{ChannelPointer, Manifest};
use super::source::ManifestSource;

/// HTTP backend for a remote release repository
pub struct RemoteSource {
    repository: String,
    client: reqwest::Client,
    retry_count: u32,
    retry_delay: Duration,
}

impl RemoteSource {
    /// Create a source for a repository base URL
    pub fn new(repository: &str, retry_count: u32, retry_delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            repository: repository.trim_end_matches('/').to_string(),
            client,
            retry_count: retry_count.max(1),
            retry_delay,
        })
    }

    /// Download a document from a URL, retrying transient failures
    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        retry_with_backoff(self.retry_count, self.retry_delay, || self.attempt(url)).await
    }

    async fn attempt(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| SourceError::Request {
                url: url.to_string(),
                source,
            })
    }

    async fn get_manifest(&self, url: &str) -> Result<Manifest, SourceError> {
        let body = self.get_text(url).await?;
        serde_yaml_ng::from_str(&body).map_err(|source| SourceError::Parse {
            what: "manifest",
            location: url.to_string(),
            source,
        })
    }
}

/// Run an operation with bounded retries and linear backoff
///
/// Up to `retry_count` attempts; attempt N is followed by a
/// `retry_delay * N` pause before the next one. Non-retryable failures
/// return immediately; on exhaustion the last observed error is returned
/// verbatim.
async fn retry_with_backoff<T, F, Fut>(
    retry_count: u32,
    retry_delay: Duration,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let retry_count = retry_count.max(1);
    let mut last_err = None;

    for attempt in 1..=retry_count {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                tracing::debug!("Attempt {}/{} failed: {}", attempt, retry_count, err);
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }

        if attempt < retry_count {
            let delay = retry_delay * attempt;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    // retry_count >= 1, so at least one attempt recorded an error
    Err(last_err.expect("retry loop exhausted without an error"))
}

#[async_trait]
impl ManifestSource for RemoteSource {
    async fn fetch_manifest(&self, channel: &str, version: &str) -> Result<Manifest, SourceError> {
        if version == "latest" {
            let pointer_url = format!("{}/channels/{}.yaml", self.repository, channel);
            tracing::debug!("Resolving channel pointer: {}", pointer_url);

            let body = self.get_text(&pointer_url).await?;
            let pointer: ChannelPointer =
                serde_yaml_ng::from_str(&body).map_err(|source| SourceError::Parse {
                    what: "channel pointer",
                    location: pointer_url.clone(),
                    source,
                })?;

            if pointer.manifest.is_empty() {
                return Err(SourceError::EmptyPointer {
                    channel: channel.to_string(),
                });
            }

            let manifest_url = format!("{}/{}", self.repository, pointer.manifest);
            return self.get_manifest(&manifest_url).await;
        }

        let manifest_url = format!("{}/releases/{}.yaml", self.repository, version);
        self.get_manifest(&manifest_url).await
    }

    fn location(&self) -> &str {
        &self.repository
    }
}
