//! Channel and version normalization
//!
//! User input arrives as a free-form string ("1.2.3", "v1.2.3", "rc",
//! "latest", ""); everything downstream works with a normalized
//! (channel, version) pair. Normalization must be applied anywhere a version
//! becomes a cache key so that "1.2.3" and "v1.2.3" address the same entry.

use once_cell::sync::Lazy;
use regex::Regex;

/// Known channel names
const CHANNELS: &[&str] = &["stable", "rc"];

static SEMVER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+").expect("semver pattern is valid"));

/// Resolve a free-form version string into (channel, version)
///
/// - `""` or `"latest"` → `("stable", "latest")`
/// - a bare channel name (`"stable"`, `"rc"`) → `(channel, "latest")`
/// - `"v1.2.3"` → `("stable", "v1.2.3")`
/// - `"1.2.3"` / `"1.2.3-rc1"` → `("stable", "v1.2.3")` / `("stable", "v1.2.3-rc1")`
/// - anything else → `("stable", input)` unchanged
pub fn resolve_version(input: &str) -> (String, String) {
    if input.is_empty() || input == "latest" {
        return ("stable".to_string(), "latest".to_string());
    }

    if CHANNELS.contains(&input) {
        return (input.to_string(), "latest".to_string());
    }

    ("stable".to_string(), normalize_version(input))
}

/// Canonicalize a version string for use as a cache key
///
/// Prepends `v` to strings shaped like a semantic version; leaves canonical
/// tags, channel names, and everything else unchanged.
pub fn normalize_version(version: &str) -> String {
    if version.is_empty() || version == "latest" {
        return "latest".to_string();
    }
    if CHANNELS.contains(&version) || version.starts_with('v') {
        return version.to_string();
    }
    if SEMVER_SHAPE.is_match(version) {
        return format!("v{version}");
    }
    version.to_string()
}
