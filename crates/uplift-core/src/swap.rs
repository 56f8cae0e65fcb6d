use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uplift_platform::backup_dir_for;

use crate::error::{UpdateError, UpdateResult};

/// Moves the live installation aside and promotes a new tree into its place.
///
/// Every transfer is a `rename`, never a copy, so at any moment either the
/// old or the new tree is the one at the active path, except for the short
/// gap between [`rename_current_project`](Self::rename_current_project) and
/// [`replace_with_new`](Self::replace_with_new).
#[derive(Debug, Clone)]
pub struct InstallationSwapper {
    active_dir: Option<PathBuf>,
}

impl InstallationSwapper {
    #[must_use]
    pub fn new(active_dir: Option<PathBuf>) -> Self {
        Self { active_dir }
    }

    /// # Errors
    /// Returns [`UpdateError::Configuration`] when no active directory was
    /// configured.
    pub fn active_dir(&self) -> UpdateResult<&Path> {
        self.active_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                UpdateError::Configuration(
                    "the active installation directory is not set".to_string(),
                )
            })
    }

    /// # Errors
    /// Returns [`UpdateError::Configuration`] when no active directory was
    /// configured.
    pub fn backup_dir(&self) -> UpdateResult<PathBuf> {
        self.active_dir().map(backup_dir_for)
    }

    /// Rename the active installation to its backup path.
    ///
    /// A backup left over from an earlier run is deleted first, but only while
    /// the active installation is still present.
    ///
    /// # Errors
    /// Returns a configuration error when the active directory is unset, and a
    /// filesystem error when the rename fails.
    pub fn rename_current_project(&self) -> UpdateResult<()> {
        let active = self.active_dir()?;
        let backup = backup_dir_for(active);

        if path_exists(&backup) && path_exists(active) {
            warn!("Removing stale backup {}", backup.display());
            remove_tree(&backup).map_err(|error| {
                UpdateError::filesystem_with_path("failed to remove stale backup", &backup, &error)
            })?;
        }

        info!("Moving {} to {}", active.display(), backup.display());
        std::fs::rename(active, &backup).map_err(|error| {
            UpdateError::filesystem_with_path(
                "failed to move current installation aside",
                active,
                &error,
            )
        })
    }

    /// Rename `new_dir` into the active path.
    ///
    /// Must follow a successful [`rename_current_project`](Self::rename_current_project).
    /// If the rename fails the backup is renamed back so the previous
    /// installation is live again.
    ///
    /// # Errors
    /// Returns a filesystem error when the active path is still occupied or the
    /// rename fails.
    pub fn replace_with_new(&self, new_dir: &Path) -> UpdateResult<()> {
        let active = self.active_dir()?;

        if path_exists(active) {
            return Err(UpdateError::filesystem_with_path(
                "refusing to replace an installation that was not moved aside",
                active,
                &std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }

        info!("Moving {} to {}", new_dir.display(), active.display());
        if let Err(error) = std::fs::rename(new_dir, active) {
            let backup = backup_dir_for(active);
            warn!("Placing new installation failed, restoring backup: {error}");
            if let Err(restore_error) = std::fs::rename(&backup, active) {
                warn!(
                    "Could not restore {}; previous installation remains at {}: {restore_error}",
                    active.display(),
                    backup.display()
                );
            }
            return Err(UpdateError::filesystem_with_path(
                "failed to move new installation into place",
                new_dir,
                &error,
            ));
        }

        Ok(())
    }

    /// Delete the backup tree, files before their directories.
    ///
    /// A missing backup is not an error.
    ///
    /// # Errors
    /// Returns a filesystem error when any entry cannot be removed.
    pub fn remove_old_project(&self) -> UpdateResult<()> {
        let backup = self.backup_dir()?;
        if !path_exists(&backup) {
            debug!("No previous installation at {}", backup.display());
            return Ok(());
        }

        info!("Removing previous installation {}", backup.display());
        remove_tree(&backup).map_err(|error| {
            UpdateError::filesystem_with_path(
                "failed to remove previous installation",
                &backup,
                &error,
            )
        })
    }

    /// Best-effort removal of an attempt's scratch run directory once its
    /// release has been promoted.
    pub fn discard_run_dir(&self, run_dir: &Path) {
        if !path_exists(run_dir) {
            return;
        }
        debug!("Cleaning up run directory {}", run_dir.display());
        if let Err(error) = remove_tree(run_dir) {
            warn!(
                "Could not clean up run directory {}: {error}",
                run_dir.display()
            );
        }
    }
}

fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Depth-first delete. Symlinks are removed, never followed.
fn remove_tree(path: &Path) -> std::io::Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return std::fs::remove_file(path);
    }

    for entry in std::fs::read_dir(path)? {
        remove_tree(&entry?.path())?;
    }
    std::fs::remove_dir(path)
}
