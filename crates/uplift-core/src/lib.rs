//! Update-installation pipeline for Uplift.
//!
//! This crate owns everything between "is there a newer release" and "the new
//! release is serving":
//! - Release lookup and semantic version comparison.
//! - Archive download and extraction into a scratch area.
//! - Dependency install and build through an external toolchain.
//! - The rename-based swap of the active installation.
//! - Service stop/start/restart around the swap.

mod builder;
mod error;
mod fetch;
mod lifecycle;
mod release;
mod swap;
#[cfg(test)]
mod testing;
mod updater;
mod version;

/// Subprocess seam and the toolchain steps run through it.
pub use builder::{
    CommandRunner, DependencyBuilder, Invocation, ProcessExit, SystemCommandRunner, Toolchain,
};
/// Error taxonomy shared by every pipeline step.
pub use error::{ToolFailure, UpdateError, UpdateResult};
/// Archive download/extraction and the archive layout helpers.
pub use fetch::{
    ArchiveFetcher, ArchiveFormat, ExtractedRelease, default_root_prefix, find_archive_root,
};
pub use lifecycle::{LifecycleController, ServiceControl};
/// Release source abstraction and the GitHub implementation.
pub use release::{
    DEFAULT_API_BASE, GitHubRelease, GitHubReleaseSource, ReleaseInfo, ReleaseSource,
    VersionResolver,
};
pub use swap::InstallationSwapper;
/// The orchestrator and its progress model.
pub use updater::{InstallPhase, InstallReport, UpdateStrategy, Updater};
pub use version::{VersionComparison, compare_versions, parse_version, strip_tag_prefix};
