use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use flate2::read::GzDecoder;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::error::{UpdateError, UpdateResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

/// Directory-name prefix GitHub uses for the root of a source archive.
#[must_use]
pub fn default_root_prefix(repository: &str) -> String {
    format!("{}-", repository.replace('/', "-"))
}

/// Where a downloaded release ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRelease {
    /// Per-attempt directory inside the scratch area.
    pub run_dir: PathBuf,
    /// The archive's single top-level directory, the tree that gets built and
    /// promoted.
    pub root: PathBuf,
}

pub struct ArchiveFetcher {
    client: reqwest::Client,
    format: ArchiveFormat,
    root_prefix: String,
}

impl ArchiveFetcher {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        format: ArchiveFormat,
        root_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            format,
            root_prefix: root_prefix.into(),
        }
    }

    /// Download the archive at `url` and unpack it into a fresh run directory
    /// under `scratch_dir`.
    ///
    /// Nothing is cleaned up on failure; the run directory stays behind.
    ///
    /// # Errors
    /// Returns a download error for transport failures or non-success
    /// responses, an extract error for malformed archives, and an ambiguous
    /// layout error unless exactly one top-level directory matches the
    /// expected prefix.
    pub async fn download_and_extract(
        &self,
        url: &str,
        scratch_dir: &Path,
    ) -> UpdateResult<ExtractedRelease> {
        tokio::fs::create_dir_all(scratch_dir)
            .await
            .map_err(|error| {
                UpdateError::filesystem_with_path(
                    "failed to create scratch directory",
                    scratch_dir,
                    &error,
                )
            })?;
        let run_dir = tempfile::Builder::new()
            .prefix("release-")
            .tempdir_in(scratch_dir)
            .map_err(|error| UpdateError::filesystem("failed to create run directory", error))?
            .keep();

        info!("Downloading {} archive from {url}", self.format.label());
        let response = self
            .client
            .get(url)
            .header("User-Agent", concat!("uplift/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|error| UpdateError::download("download request failed", error))?;

        if !response.status().is_success() {
            return Err(UpdateError::download(
                "download failed",
                format!("HTTP {}", response.status()),
            ));
        }

        match self.format {
            ArchiveFormat::TarGz => stream_tar_gz(response, &run_dir).await?,
            ArchiveFormat::Zip => {
                let archive_path = run_dir.join("release.zip");
                download_file(response, &archive_path).await?;
                let dest = run_dir.clone();
                let zip_path = archive_path.clone();
                tokio::task::spawn_blocking(move || extract_zip(&zip_path, &dest))
                    .await
                    .map_err(|error| {
                        UpdateError::extract(format!("extraction task failed: {error}"))
                    })??;
                if let Err(error) = tokio::fs::remove_file(&archive_path).await {
                    warn!(
                        "Could not remove downloaded archive {}: {error}",
                        archive_path.display()
                    );
                }
            }
        }

        let root = find_archive_root(&run_dir, &self.root_prefix)?;
        info!("Release extracted to {}", root.display());
        Ok(ExtractedRelease { run_dir, root })
    }
}

/// Pipe the response body through gzip and tar without touching disk first.
async fn stream_tar_gz(response: reqwest::Response, dest: &Path) -> UpdateResult<()> {
    let transport_error: Arc<Mutex<Option<String>>> = Arc::default();
    let recorder = Arc::clone(&transport_error);

    let body = response.bytes_stream().map(move |chunk| {
        chunk.map_err(|error| {
            recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert_with(|| error.to_string());
            std::io::Error::other(error)
        })
    });
    let reader = SyncIoBridge::new(StreamReader::new(Box::pin(body)));
    let dest = dest.to_path_buf();

    let unpacked = tokio::task::spawn_blocking(move || {
        let mut archive = tar::Archive::new(GzDecoder::new(reader));
        archive.set_preserve_permissions(true);
        archive.unpack(&dest)
    })
    .await
    .map_err(|error| UpdateError::extract(format!("extraction task failed: {error}")))?;

    if let Err(error) = unpacked {
        let transport = transport_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        return Err(match transport {
            Some(details) => UpdateError::download("download stream error", details),
            None => UpdateError::extract(error),
        });
    }

    debug!("Streaming extraction complete");
    Ok(())
}

async fn download_file(response: reqwest::Response, dest: &Path) -> UpdateResult<()> {
    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        UpdateError::filesystem_with_path("failed to create download file", dest, &error)
    })?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| UpdateError::download("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            UpdateError::filesystem_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|error| {
        UpdateError::filesystem_with_path("failed to flush download file", dest, &error)
    })?;

    debug!("Download complete: {downloaded} bytes");
    Ok(())
}

fn extract_zip(zip_path: &Path, dest: &Path) -> UpdateResult<()> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        UpdateError::filesystem_with_path("failed to open zip file", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(UpdateError::extract)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(UpdateError::extract)?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                UpdateError::filesystem_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                UpdateError::filesystem_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            UpdateError::filesystem_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(UpdateError::extract)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Locate the single top-level directory named `<prefix><suffix>`.
///
/// # Errors
/// Returns [`UpdateError::AmbiguousArchiveLayout`] when zero or several
/// directories match.
pub fn find_archive_root(dir: &Path, prefix: &str) -> UpdateResult<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|error| {
        UpdateError::filesystem_with_path("failed to read extraction directory", dir, &error)
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|error| UpdateError::filesystem("failed to read extraction entry", error))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
        if is_dir && name.len() > prefix.len() && name.starts_with(prefix) {
            found.push(name);
        }
    }
    found.sort();

    match found.as_slice() {
        [single] => Ok(dir.join(single)),
        _ => Err(UpdateError::AmbiguousArchiveLayout {
            prefix: prefix.to_string(),
            found,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ArchiveFetcher, ArchiveFormat, default_root_prefix, extract_zip, find_archive_root};
    use crate::error::UpdateError;

    const PREFIX: &str = "Kkoile-figure-speaker-";

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("tar entry should be appended");
        }
        builder
            .into_inner()
            .expect("tar stream should finish")
            .finish()
            .expect("gzip stream should finish")
    }

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, contents) in files {
            writer
                .start_file(*name, options)
                .expect("zip entry should be started");
            writer
                .write_all(contents)
                .expect("zip entry should be written");
        }
        writer
            .finish()
            .expect("zip archive should be finalized")
            .into_inner()
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    fn fetcher(format: ArchiveFormat) -> ArchiveFetcher {
        ArchiveFetcher::new(reqwest::Client::new(), format, PREFIX)
    }

    #[test]
    fn default_prefix_follows_github_naming() {
        assert_eq!(default_root_prefix("Kkoile/figure-speaker"), PREFIX);
    }

    #[tokio::test]
    async fn tar_gz_is_streamed_into_run_directory() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/tarball/v2.0.0",
            tar_gz(&[
                ("Kkoile-figure-speaker-abc1234/package.json", b"{}"),
                ("Kkoile-figure-speaker-abc1234/src/index.js", b"console.log(1)"),
            ]),
        )
        .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let extracted = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&format!("{}/tarball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect("archive should extract");

        assert!(extracted.run_dir.starts_with(scratch.path()));
        assert_eq!(
            extracted.root,
            extracted.run_dir.join("Kkoile-figure-speaker-abc1234")
        );
        let script = std::fs::read(extracted.root.join("src/index.js"))
            .expect("extracted file should be readable");
        assert_eq!(script, b"console.log(1)");
    }

    #[tokio::test]
    async fn zip_is_downloaded_extracted_and_removed() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/zipball/v2.0.0",
            zip_bytes(&[("Kkoile-figure-speaker-abc1234/package.json", b"{\"name\":\"x\"}")]),
        )
        .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let extracted = fetcher(ArchiveFormat::Zip)
            .download_and_extract(&format!("{}/zipball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect("archive should extract");

        assert!(extracted.root.join("package.json").is_file());
        assert!(!extracted.run_dir.join("release.zip").exists());
    }

    #[tokio::test]
    async fn each_attempt_uses_its_own_run_directory() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/tarball/v2.0.0",
            tar_gz(&[("Kkoile-figure-speaker-abc1234/package.json", b"{}")]),
        )
        .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");
        let url = format!("{}/tarball/v2.0.0", server.uri());

        let first = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&url, scratch.path())
            .await
            .expect("first attempt should extract");
        let second = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&url, scratch.path())
            .await
            .expect("stale extraction should not make the second attempt ambiguous");

        assert_ne!(first.run_dir, second.run_dir);
    }

    #[tokio::test]
    async fn several_matching_roots_are_ambiguous() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/tarball/v2.0.0",
            tar_gz(&[
                ("Kkoile-figure-speaker-aaa/package.json", b"{}"),
                ("Kkoile-figure-speaker-bbb/package.json", b"{}"),
            ]),
        )
        .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let error = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&format!("{}/tarball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect_err("two roots should be rejected");

        assert!(matches!(
            error,
            UpdateError::AmbiguousArchiveLayout { ref found, .. } if found.len() == 2
        ));
    }

    #[tokio::test]
    async fn missing_root_is_ambiguous() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/tarball/v2.0.0",
            tar_gz(&[("other-project-abc/package.json", b"{}")]),
        )
        .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let error = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&format!("{}/tarball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect_err("no matching root should be rejected");

        assert!(matches!(
            error,
            UpdateError::AmbiguousArchiveLayout { ref found, .. } if found.is_empty()
        ));
    }

    #[tokio::test]
    async fn non_success_status_is_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tarball/v2.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let error = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&format!("{}/tarball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect_err("404 should fail");

        assert!(matches!(
            error,
            UpdateError::Download { ref details, .. } if details.contains("404")
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_an_extract_error() {
        let server = MockServer::start().await;
        serve(&server, "/tarball/v2.0.0", b"definitely not gzip".to_vec()).await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let error = fetcher(ArchiveFormat::TarGz)
            .download_and_extract(&format!("{}/tarball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect_err("garbage should fail to extract");

        assert!(matches!(error, UpdateError::Extract { .. }));
    }

    #[tokio::test]
    async fn garbage_zip_is_an_extract_error() {
        let server = MockServer::start().await;
        serve(&server, "/zipball/v2.0.0", b"definitely not zip".to_vec()).await;
        let scratch = tempfile::tempdir().expect("tempdir should be created");

        let error = fetcher(ArchiveFormat::Zip)
            .download_and_extract(&format!("{}/zipball/v2.0.0", server.uri()), scratch.path())
            .await
            .expect_err("garbage should fail to extract");

        assert!(matches!(error, UpdateError::Extract { .. }));
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");
        std::fs::write(
            &zip_path,
            zip_bytes(&[("../outside.txt", b"should not be extracted")]),
        )
        .expect("zip file should be written");

        extract_zip(&zip_path, &extract_dir).expect("zip extraction should not fail");

        assert!(
            !temp.path().join("outside.txt").exists(),
            "unsafe path should not be extracted outside destination"
        );
    }

    #[test]
    fn find_archive_root_ignores_files_and_other_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::create_dir(temp.path().join("Kkoile-figure-speaker-abc"))
            .expect("root dir should be created");
        std::fs::create_dir(temp.path().join("unrelated")).expect("dir should be created");
        std::fs::create_dir(temp.path().join(PREFIX)).expect("bare prefix dir should be created");
        std::fs::write(temp.path().join("Kkoile-figure-speaker-file"), b"x")
            .expect("file should be written");

        let root = find_archive_root(temp.path(), PREFIX).expect("single root should be found");

        assert_eq!(root, temp.path().join("Kkoile-figure-speaker-abc"));
    }
}
