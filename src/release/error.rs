//! Source-level error taxonomy
//!
//! The error class drives behavior in the retry loop and the orchestrator:
//! transient failures (HTTP 429/5xx, transport errors) are retried up to the
//! attempt budget, everything else fails immediately. Parse errors are never
//! retried; refetching cannot fix malformed content.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the remote and local manifest sources
#[derive(Error, Debug)]
pub enum SourceError {
    /// Non-2xx HTTP response
    #[error("Fetch failed: {url} (HTTP {status})")]
    Http { url: String, status: u16 },

    /// Network-level failure (connection refused, timeout, TLS, ...)
    #[error("Failed to download {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Retrieved content is not parseable YAML
    #[error("Failed to parse {what} from {location}")]
    Parse {
        what: &'static str,
        location: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// Channel pointer exists but names no manifest path
    #[error("Channel pointer '{channel}' has no manifest path")]
    EmptyPointer { channel: String },

    /// Local repository file could not be read
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fallback scan found no release manifests
    #[error("No release manifests found in {dir}")]
    NoReleases { dir: PathBuf },
}

impl SourceError {
    /// Whether another attempt could plausibly succeed
    ///
    /// HTTP 429 and 5xx responses and transport errors are transient; other
    /// statuses, parse failures, and local I/O failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            SourceError::Request { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let http = |status| SourceError::Http {
            url: "https://example.com/x.yaml".to_string(),
            status,
        };

        assert!(http(429).is_retryable());
        assert!(http(500).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!http(403).is_retryable());
        assert!(!http(400).is_retryable());
    }

    #[test]
    fn test_permanent_classes_not_retryable() {
        let parse = SourceError::Parse {
            what: "manifest",
            location: "releases/v1.yaml".to_string(),
            source: serde_yaml_ng::from_str::<i32>("{not yaml").unwrap_err(),
        };
        assert!(!parse.is_retryable());

        let empty = SourceError::EmptyPointer {
            channel: "stable".to_string(),
        };
        assert!(!empty.is_retryable());

        let io = SourceError::Io {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(!io.is_retryable());
    }
}
