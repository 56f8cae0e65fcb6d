use std::path::Path;

/// Shim scripts that package managers install as `.cmd` files on Windows.
const WINDOWS_CMD_SHIMS: &[&str] = &["npm", "npx", "yarn", "pnpm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    Windows,
    Unix,
}

impl HostFamily {
    #[must_use]
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Classify an OS identifier as reported by `std::env::consts::OS`.
    #[must_use]
    pub fn from_os(os: &str) -> Self {
        if os.starts_with("win") {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// Resolve the executable name for a toolchain binary on the given host.
///
/// Names that already carry an extension are returned untouched.
#[must_use]
pub fn executable_name(base: &str, family: HostFamily) -> String {
    if family == HostFamily::Unix || Path::new(base).extension().is_some() {
        return base.to_string();
    }

    if WINDOWS_CMD_SHIMS.contains(&base) {
        format!("{base}.cmd")
    } else {
        format!("{base}.exe")
    }
}
