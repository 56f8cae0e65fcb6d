use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::error::{UpdateError, UpdateResult};
use crate::fetch::ArchiveFormat;
use crate::version::{VersionComparison, compare_versions, strip_tag_prefix};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// The newest published release as reported by the release source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Version tag exactly as published, possibly with a `v` marker.
    pub version: String,
    pub archive_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub tarball_url: Option<String>,
    #[serde(default)]
    pub zipball_url: Option<String>,
}

impl GitHubRelease {
    fn into_release_info(self, format: ArchiveFormat) -> UpdateResult<ReleaseInfo> {
        let archive_url = match format {
            ArchiveFormat::TarGz => self.tarball_url,
            ArchiveFormat::Zip => self.zipball_url,
        }
        .filter(|url| !url.is_empty())
        .ok_or_else(|| UpdateError::ReleaseSource {
            details: format!(
                "release {} has no {} download URL",
                self.tag_name,
                format.label()
            ),
        })?;

        Ok(ReleaseInfo {
            version: self.tag_name,
            archive_url,
        })
    }
}

/// Anything that can report the latest published release.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self) -> UpdateResult<ReleaseInfo>;
}

/// Reads the `releases/latest` record of a GitHub repository.
pub struct GitHubReleaseSource {
    client: reqwest::Client,
    api_base: String,
    repository: String,
    format: ArchiveFormat,
    timeout: Option<Duration>,
}

impl GitHubReleaseSource {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        repository: impl Into<String>,
        format: ArchiveFormat,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            repository: repository.into(),
            format,
            timeout: None,
        }
    }

    /// Bound the whole release lookup, from connect to the parsed body.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.repository
        )
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    async fn latest_release(&self) -> UpdateResult<ReleaseInfo> {
        let url = self.latest_release_url();
        debug!("Requesting latest release from {url}");

        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", concat!("uplift/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(UpdateError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(UpdateError::ReleaseSource {
                details: format!("HTTP {status}{body_snippet}"),
            });
        }

        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|error| UpdateError::ReleaseSource {
                details: format!("failed to parse release record: {error}"),
            })?;

        release.into_release_info(self.format)
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

/// Answers "what is the newest version" on top of a [`ReleaseSource`].
#[derive(Clone)]
pub struct VersionResolver {
    source: Arc<dyn ReleaseSource>,
}

impl VersionResolver {
    #[must_use]
    pub fn new(source: Arc<dyn ReleaseSource>) -> Self {
        Self { source }
    }

    /// # Errors
    /// Returns a network or release-source error when the release record
    /// cannot be fetched.
    pub async fn latest_release(&self) -> UpdateResult<ReleaseInfo> {
        self.source.latest_release().await
    }

    /// Latest published version with a leading tag marker removed.
    ///
    /// # Errors
    /// Same as [`VersionResolver::latest_release`].
    pub async fn latest_version(&self) -> UpdateResult<String> {
        let release = self.latest_release().await?;
        Ok(strip_tag_prefix(&release.version).to_string())
    }

    /// # Errors
    /// Fails when the release cannot be fetched or either version is
    /// malformed.
    pub async fn check_for_update(&self, current_version: &str) -> UpdateResult<VersionComparison> {
        debug!("Checking for update since version {current_version}");
        let latest = self.latest_version().await?;
        let comparison = compare_versions(current_version, &latest)?;
        info!(
            "Latest version is {latest} (current {current_version}, update available: {})",
            comparison.higher_version_available
        );
        Ok(comparison)
    }
}
