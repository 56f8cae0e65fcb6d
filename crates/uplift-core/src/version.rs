use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Result of comparing the running version against the latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionComparison {
    pub latest_version: String,
    pub higher_version_available: bool,
}

/// Drop a single leading non-numeric marker such as the `v` in `v1.2.3`.
///
/// Only one character is removed and nothing else is normalized.
#[must_use]
pub fn strip_tag_prefix(tag: &str) -> &str {
    match tag.chars().next() {
        Some(first) if !first.is_ascii_digit() => &tag[first.len_utf8()..],
        _ => tag,
    }
}

/// Compare two version strings by semantic-version precedence.
///
/// Both sides may carry a tag marker (`v1.2.3`); `latest_version` is reported
/// without it.
///
/// # Errors
/// Returns [`UpdateError::VersionFormat`] naming the input exactly as given
/// when either side cannot be parsed.
pub fn compare_versions(current: &str, latest: &str) -> Result<VersionComparison, UpdateError> {
    let current_parsed = parse_tagged(current)?;
    let latest_parsed = parse_tagged(latest)?;

    Ok(VersionComparison {
        latest_version: strip_tag_prefix(latest).to_string(),
        higher_version_available: latest_parsed > current_parsed,
    })
}

fn parse_tagged(version: &str) -> Result<Version, UpdateError> {
    parse_semver(strip_tag_prefix(version)).ok_or_else(|| UpdateError::VersionFormat {
        version: version.to_string(),
    })
}

/// Parse a version, accepting the shortened `1` and `1.2` forms as `1.0.0`
/// and `1.2.0`.
///
/// # Errors
/// Returns [`UpdateError::VersionFormat`] when the string is not a version.
pub fn parse_version(version: &str) -> Result<Version, UpdateError> {
    parse_semver(version).ok_or_else(|| UpdateError::VersionFormat {
        version: version.to_string(),
    })
}

fn parse_semver(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = match parts.next() {
        Some(part) => Some(part.parse::<u64>().ok()?),
        None => None,
    };
    let patch = match parts.next() {
        Some(part) => Some(part.parse::<u64>().ok()?),
        None => None,
    };

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}
