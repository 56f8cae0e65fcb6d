use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Suffix appended to the active installation directory while the previous
/// tree is kept aside during a swap.
pub const BACKUP_SUFFIX: &str = "_OLD";

/// Suffix of the default scratch directory, kept next to the active
/// installation so promoting a release stays a same-filesystem rename.
pub const SCRATCH_SUFFIX: &str = "_SCRATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build the updater's own directories for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support/uplift"),
                data_dir: home.join("Library/Application Support/uplift"),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join("uplift"),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join("uplift"),
            })
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("uplift.log")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Sibling path that holds the previous installation during a swap.
///
/// Trailing separators are ignored, so `/srv/app/` and `/srv/app` both map to
/// `/srv/app_OLD`.
#[must_use]
pub fn backup_dir_for(active_dir: &Path) -> PathBuf {
    suffixed_sibling(active_dir, BACKUP_SUFFIX)
}

/// Default scratch directory for an installation, e.g. `/srv/app_SCRATCH`.
#[must_use]
pub fn scratch_dir_for(active_dir: &Path) -> PathBuf {
    suffixed_sibling(active_dir, SCRATCH_SUFFIX)
}

fn suffixed_sibling(path: &Path, suffix: &str) -> PathBuf {
    let normalized: PathBuf = path.components().collect();
    let mut name = OsString::from(normalized.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{AppPaths, backup_dir_for, scratch_dir_for};

    fn test_paths() -> AppPaths {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "uplift-platform-paths-test-{}-{}",
            std::process::id(),
            nonce
        ));
        AppPaths {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    #[test]
    fn file_paths_use_expected_filenames() {
        let paths = test_paths();

        assert!(
            paths
                .settings_file()
                .ends_with(Path::new("config").join("settings.json"))
        );
        assert!(
            paths
                .log_file()
                .ends_with(Path::new("data").join("uplift.log"))
        );
    }

    #[test]
    fn ensure_dirs_creates_only_config_and_data() {
        let paths = test_paths();
        let root = paths
            .config_dir
            .parent()
            .expect("config dir should have a parent")
            .to_path_buf();

        paths
            .ensure_dirs()
            .expect("ensure_dirs should create application directories");

        let mut created: Vec<_> = std::fs::read_dir(&root)
            .expect("root should be readable")
            .map(|entry| entry.expect("entry should be readable").file_name())
            .collect();
        created.sort();
        assert_eq!(created, ["config", "data"]);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn backup_dir_is_a_suffixed_sibling() {
        let active = Path::new("/srv").join("figure-speaker");
        assert_eq!(
            backup_dir_for(&active),
            PathBuf::from("/srv").join("figure-speaker_OLD")
        );
    }

    #[test]
    fn scratch_dir_is_a_suffixed_sibling() {
        let active = Path::new("/srv").join("figure-speaker");
        assert_eq!(
            scratch_dir_for(&active),
            PathBuf::from("/srv").join("figure-speaker_SCRATCH")
        );
    }

    #[test]
    fn backup_dir_ignores_trailing_separator() {
        let active = PathBuf::from(format!("/srv/app{}", std::path::MAIN_SEPARATOR));
        assert_eq!(backup_dir_for(&active), Path::new("/srv").join("app_OLD"));
    }
}
