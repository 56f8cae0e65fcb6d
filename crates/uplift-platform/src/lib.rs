//! Host-level helpers shared by the updater crates.
//!
//! Nothing here performs an update step on its own; these are the pieces that
//! differ per host: where the service keeps its files, how a toolchain binary
//! is named, and how a child process is spawned so its output stays visible.

mod commands;
mod paths;
mod toolchain;

pub use commands::{HideWindow, inherited_command};
pub use paths::{
    AppPaths, AppPathsError, BACKUP_SUFFIX, SCRATCH_SUFFIX, backup_dir_for, scratch_dir_for,
};
pub use toolchain::{HostFamily, executable_name};
