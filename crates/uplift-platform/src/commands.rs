use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

pub trait HideWindow {
    fn hide_window(&mut self) -> &mut Self;
}

impl HideWindow for tokio::process::Command {
    #[cfg(windows)]
    fn hide_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_window(&mut self) -> &mut Self {
        self
    }
}

/// Build a child command that shares the parent's environment and standard
/// streams, so toolchain output shows up live in the service log instead of
/// being captured.
///
/// The child is killed if the returned command's handle is dropped before it
/// exits, which is how callers enforce a timeout.
pub fn inherited_command<S, I, A>(
    program: S,
    args: I,
    working_dir: Option<&Path>,
) -> tokio::process::Command
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    if let Some(dir) = working_dir {
        log::debug!("Setting working directory {}", dir.display());
        cmd.current_dir(dir);
    }

    cmd.hide_window();
    cmd
}
