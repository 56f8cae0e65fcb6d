use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use uplift_platform::{HostFamily, executable_name, inherited_command};

use crate::error::{ToolFailure, UpdateError, UpdateResult};

/// One external command to run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    #[must_use]
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns subprocesses on behalf of the pipeline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation and wait for it to exit.
    ///
    /// An `Err` means the process never started; a started process always
    /// yields its exit.
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessExit>;
}

/// Runs commands on the host with the parent's environment and streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessExit> {
        let program = which::which(&invocation.program).map_err(|error| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: {error}", invocation.program),
            )
        })?;
        debug!("Resolved {} to {}", invocation.program, program.display());

        let status = inherited_command(
            &program,
            &invocation.args,
            invocation.working_dir.as_deref(),
        )
        .status()
        .await?;

        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

/// Run an invocation, treating anything but exit code zero as failure.
pub(crate) async fn run_to_success(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    timeout: Option<Duration>,
) -> Result<(), ToolFailure> {
    info!("Running {}", invocation.command_line());
    let run = runner.run(invocation);

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| ToolFailure::TimedOut {
                seconds: limit.as_secs(),
            })?,
        None => run.await,
    };

    let exit = outcome.map_err(|error| ToolFailure::Launch(error.to_string()))?;
    debug!("{} exited with {:?}", invocation.program, exit.code);

    if exit.success() {
        Ok(())
    } else {
        Err(ToolFailure::ExitCode(exit.code))
    }
}

/// The project's build toolchain and the arguments for each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub program: String,
    pub install_args: Vec<String>,
    pub build_args: Vec<String>,
}

impl Toolchain {
    /// npm with `install` and `run build`, named for the current host.
    #[must_use]
    pub fn npm() -> Self {
        Self {
            program: executable_name("npm", HostFamily::current()),
            install_args: vec!["install".to_string()],
            build_args: vec!["run".to_string(), "build".to_string()],
        }
    }
}

pub struct DependencyBuilder {
    runner: Arc<dyn CommandRunner>,
    toolchain: Toolchain,
    timeout: Option<Duration>,
}

impl DependencyBuilder {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        toolchain: Toolchain,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            toolchain,
            timeout,
        }
    }

    /// # Errors
    /// Returns [`UpdateError::BuildTool`] if the toolchain cannot be launched
    /// or exits non-zero.
    pub async fn install_dependencies(&self, dir: &Path) -> UpdateResult<()> {
        let invocation =
            Invocation::new(&self.toolchain.program, &self.toolchain.install_args).in_dir(dir);
        self.run_step("dependency install", &invocation).await
    }

    /// # Errors
    /// Returns [`UpdateError::BuildTool`] if the toolchain cannot be launched
    /// or exits non-zero.
    pub async fn build_project(&self, dir: &Path) -> UpdateResult<()> {
        let invocation =
            Invocation::new(&self.toolchain.program, &self.toolchain.build_args).in_dir(dir);
        self.run_step("project build", &invocation).await
    }

    /// Install the newest published `package` globally through the toolchain.
    ///
    /// # Errors
    /// Returns [`UpdateError::BuildTool`] if the toolchain cannot be launched
    /// or exits non-zero.
    pub async fn install_global_package(&self, package: &str) -> UpdateResult<()> {
        let invocation = Invocation::new(
            &self.toolchain.program,
            ["install".to_string(), "-g".to_string(), format!("{package}@latest")],
        );
        self.run_step("package install", &invocation).await
    }

    async fn run_step(&self, step: &'static str, invocation: &Invocation) -> UpdateResult<()> {
        run_to_success(self.runner.as_ref(), invocation, self.timeout)
            .await
            .map_err(|failure| {
                error!("{step} failed: {failure}");
                UpdateError::BuildTool { step, failure }
            })
    }
}
