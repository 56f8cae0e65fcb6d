use std::path::PathBuf;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use uplift_platform::scratch_dir_for;

use crate::builder::DependencyBuilder;
use crate::error::{UpdateError, UpdateResult};
use crate::fetch::ArchiveFetcher;
use crate::lifecycle::LifecycleController;
use crate::release::VersionResolver;
use crate::swap::InstallationSwapper;
use crate::version::{VersionComparison, strip_tag_prefix};

/// Where an installation currently stands. Phases only move forward;
/// `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum InstallPhase {
    Idle,
    Downloading,
    Extracted,
    InstallingDeps,
    Building,
    Stopping,
    Swapping,
    RemovingOld,
    Starting,
    Done,
    Failed { reason: String },
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Downloading => write!(f, "downloading"),
            Self::Extracted => write!(f, "extracted"),
            Self::InstallingDeps => write!(f, "installing dependencies"),
            Self::Building => write!(f, "building"),
            Self::Stopping => write!(f, "stopping service"),
            Self::Swapping => write!(f, "swapping installation"),
            Self::RemovingOld => write!(f, "removing previous installation"),
            Self::Starting => write!(f, "starting service"),
            Self::Done => write!(f, "done"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStrategy {
    /// Download the release source, build it and swap it into place.
    #[default]
    Rebuild,
    /// Reinstall the published package globally and restart the service.
    PackageManager,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    pub installed_version: String,
}

struct PhaseReporter {
    current: InstallPhase,
    progress: Option<mpsc::Sender<InstallPhase>>,
}

impl PhaseReporter {
    fn new(progress: Option<mpsc::Sender<InstallPhase>>) -> Self {
        Self {
            current: InstallPhase::Idle,
            progress,
        }
    }

    /// Never waits on the receiver: a full channel drops the update.
    fn enter(&mut self, phase: InstallPhase) {
        info!("Install phase: {phase}");
        self.current = phase.clone();
        if let Some(progress) = &self.progress {
            match progress.try_send(phase) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(phase)) => {
                    warn!("Progress receiver is full, dropping phase update: {phase}");
                }
            }
        }
    }
}

/// Ties the pipeline components together behind the two public operations.
pub struct Updater {
    resolver: VersionResolver,
    fetcher: ArchiveFetcher,
    builder: DependencyBuilder,
    lifecycle: LifecycleController,
    swapper: InstallationSwapper,
    scratch_dir: Option<PathBuf>,
    strategy: UpdateStrategy,
    package: Option<String>,
    install_lock: Mutex<()>,
}

impl Updater {
    #[must_use]
    pub fn new(
        resolver: VersionResolver,
        fetcher: ArchiveFetcher,
        builder: DependencyBuilder,
        lifecycle: LifecycleController,
        swapper: InstallationSwapper,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            builder,
            lifecycle,
            swapper,
            scratch_dir: None,
            strategy: UpdateStrategy::default(),
            package: None,
            install_lock: Mutex::new(()),
        }
    }

    /// Extract releases under `scratch_dir` instead of the sibling of the
    /// active directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, scratch_dir: Option<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Package reinstalled by [`UpdateStrategy::PackageManager`].
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// # Errors
    /// Fails when the release source is unreachable or a version is
    /// malformed.
    pub async fn check_for_update(&self, current_version: &str) -> UpdateResult<VersionComparison> {
        self.resolver.check_for_update(current_version).await
    }

    /// # Errors
    /// See [`Updater::install_latest_with_progress`].
    pub async fn install_latest(&self) -> UpdateResult<InstallReport> {
        self.install_latest_with_progress(None).await
    }

    /// Install the newest release, reporting every phase on `progress`.
    ///
    /// Progress is sent without waiting, so a receiver that is not drained
    /// concurrently only misses updates once its buffer is full.
    ///
    /// A call made while another installation runs fails at once with
    /// [`UpdateError::InstallInProgress`] and reports nothing.
    ///
    /// # Errors
    /// Returns the error of the first failing step. The pipeline stops
    /// there and is not resumed.
    pub async fn install_latest_with_progress(
        &self,
        progress: Option<mpsc::Sender<InstallPhase>>,
    ) -> UpdateResult<InstallReport> {
        let Ok(_guard) = self.install_lock.try_lock() else {
            warn!("Rejected install request: another installation is in progress");
            return Err(UpdateError::InstallInProgress);
        };

        let mut reporter = PhaseReporter::new(progress);
        reporter.enter(InstallPhase::Idle);

        let outcome = match self.strategy {
            UpdateStrategy::Rebuild => self.rebuild(&mut reporter).await,
            UpdateStrategy::PackageManager => self.reinstall_package(&mut reporter).await,
        };

        match outcome {
            Ok(report) => {
                reporter.enter(InstallPhase::Done);
                info!("Installed version {}", report.installed_version);
                Ok(report)
            }
            Err(failure) => {
                error!("Install failed while {}: {failure}", reporter.current);
                reporter.enter(InstallPhase::Failed {
                    reason: failure.to_string(),
                });
                Err(failure)
            }
        }
    }

    async fn rebuild(&self, reporter: &mut PhaseReporter) -> UpdateResult<InstallReport> {
        let active_dir = self.swapper.active_dir()?.to_path_buf();
        let scratch_dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(|| scratch_dir_for(&active_dir));

        reporter.enter(InstallPhase::Downloading);
        let release = self.resolver.latest_release().await?;
        let version = strip_tag_prefix(&release.version).to_string();
        info!("Installing version {version} into {}", active_dir.display());
        let extracted = self
            .fetcher
            .download_and_extract(&release.archive_url, &scratch_dir)
            .await?;
        reporter.enter(InstallPhase::Extracted);

        reporter.enter(InstallPhase::InstallingDeps);
        self.builder.install_dependencies(&extracted.root).await?;

        reporter.enter(InstallPhase::Building);
        self.builder.build_project(&extracted.root).await?;

        reporter.enter(InstallPhase::Stopping);
        self.lifecycle.stop_service().await?;

        reporter.enter(InstallPhase::Swapping);
        self.swapper.rename_current_project()?;
        self.swapper.replace_with_new(&extracted.root)?;

        reporter.enter(InstallPhase::RemovingOld);
        self.swapper.remove_old_project()?;
        self.swapper.discard_run_dir(&extracted.run_dir);

        reporter.enter(InstallPhase::Starting);
        self.lifecycle.start_service().await?;

        Ok(InstallReport {
            installed_version: version,
        })
    }

    async fn reinstall_package(&self, reporter: &mut PhaseReporter) -> UpdateResult<InstallReport> {
        let package = self
            .package
            .as_deref()
            .filter(|package| !package.is_empty())
            .ok_or_else(|| {
                UpdateError::Configuration("no package name configured".to_string())
            })?;
        let version = self.resolver.latest_version().await?;

        reporter.enter(InstallPhase::InstallingDeps);
        self.builder.install_global_package(package).await?;

        reporter.enter(InstallPhase::Starting);
        self.lifecycle.restart_service().await?;

        Ok(InstallReport {
            installed_version: version,
        })
    }
}
