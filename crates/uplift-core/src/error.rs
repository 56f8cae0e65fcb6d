use std::path::Path;

use thiserror::Error;

/// How a toolchain subprocess failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// The process ran and exited unsuccessfully. `None` when it was killed by
    /// a signal and no exit code exists.
    ExitCode(Option<i32>),
    /// The process could not be started at all.
    Launch(String),
    /// The process did not finish within the configured timeout.
    TimedOut { seconds: u64 },
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitCode(Some(code)) => write!(f, "exited with code {code}"),
            Self::ExitCode(None) => write!(f, "terminated by signal"),
            Self::Launch(details) => write!(f, "failed to launch: {details}"),
            Self::TimedOut { seconds } => write!(f, "timed out after {seconds}s"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to reach release source: {0}")]
    Network(#[source] reqwest::Error),

    #[error("release source error: {details}")]
    ReleaseSource { details: String },

    #[error("{context}: {details}")]
    Download {
        context: &'static str,
        details: String,
    },

    #[error("failed to extract archive: {details}")]
    Extract { details: String },

    #[error(
        "expected exactly one extracted directory starting with '{prefix}', found {}",
        describe_candidates(.found)
    )]
    AmbiguousArchiveLayout { prefix: String, found: Vec<String> },

    #[error("{step} {failure}")]
    BuildTool {
        step: &'static str,
        failure: ToolFailure,
    },

    #[error("{context}: {source}")]
    Filesystem {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("service {action} failed: {details}")]
    Lifecycle {
        action: &'static str,
        details: String,
    },

    #[error("invalid version '{version}'")]
    VersionFormat { version: String },

    #[error("an installation is already in progress")]
    InstallInProgress,
}

fn describe_candidates(found: &[String]) -> String {
    if found.is_empty() {
        "none".to_string()
    } else {
        found.join(", ")
    }
}

impl UpdateError {
    pub(crate) fn download(context: &'static str, details: impl std::fmt::Display) -> Self {
        Self::Download {
            context,
            details: details.to_string(),
        }
    }

    pub(crate) fn extract(details: impl std::fmt::Display) -> Self {
        Self::Extract {
            details: details.to_string(),
        }
    }

    pub(crate) fn filesystem(context: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { context, source }
    }

    pub(crate) fn filesystem_with_path(
        context: &'static str,
        path: &Path,
        source: &std::io::Error,
    ) -> Self {
        Self::filesystem(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    pub(crate) fn lifecycle(action: &'static str, details: impl std::fmt::Display) -> Self {
        Self::Lifecycle {
            action,
            details: details.to_string(),
        }
    }
}

pub type UpdateResult<T> = Result<T, UpdateError>;
