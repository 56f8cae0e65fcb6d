use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uplift_core::{
    ArchiveFormat, DEFAULT_API_BASE, ServiceControl, Toolchain, UpdateStrategy,
    default_root_prefix,
};
use uplift_platform::{AppPaths, HostFamily, executable_name};

pub const CONFIG_ENV: &str = "UPLIFT_CONFIG";
pub const ACTIVE_DIR_ENV: &str = "UPLIFT_ACTIVE_DIR";
pub const SCRATCH_DIR_ENV: &str = "UPLIFT_SCRATCH_DIR";
pub const DEBUG_ENV: &str = "UPLIFT_DEBUG";
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// `owner/name` of the repository whose releases are installed.
    #[serde(default = "default_repository")]
    pub repository: String,

    #[serde(default)]
    pub archive_format: ArchiveFormat,

    #[serde(default)]
    pub archive_root_prefix: Option<String>,

    #[serde(default)]
    pub active_dir: Option<PathBuf>,

    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_toolchain_program")]
    pub toolchain_program: String,

    #[serde(default = "default_install_args")]
    pub install_args: Vec<String>,

    #[serde(default = "default_build_args")]
    pub build_args: Vec<String>,

    #[serde(default = "default_package")]
    pub package: String,

    #[serde(default)]
    pub strategy: UpdateStrategy,

    #[serde(default)]
    pub service_control: ServiceControl,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_repository() -> String {
    "Kkoile/figure-speaker".to_string()
}

fn default_toolchain_program() -> String {
    executable_name("npm", HostFamily::current())
}

fn default_install_args() -> Vec<String> {
    vec!["install".to_string()]
}

fn default_build_args() -> Vec<String> {
    vec!["run".to_string(), "build".to_string()]
}

fn default_package() -> String {
    "figure-speaker".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_port() -> u16 {
    3001
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            repository: default_repository(),
            archive_format: ArchiveFormat::default(),
            archive_root_prefix: None,
            active_dir: None,
            scratch_dir: None,
            toolchain_program: default_toolchain_program(),
            install_args: default_install_args(),
            build_args: default_build_args(),
            package: default_package(),
            strategy: UpdateStrategy::default(),
            service_control: ServiceControl::default(),
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: None,
            port: default_port(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Read the settings file and apply environment overrides, resolving
    /// variables through `lookup`.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let settings_path = lookup(CONFIG_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| AppPaths::new().ok().map(|paths| paths.settings_file()));

        let mut settings = settings_path
            .as_deref()
            .map(Self::read_file)
            .unwrap_or_default();
        settings.apply_env(&lookup);
        settings
    }

    fn read_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(active_dir) = non_empty(ACTIVE_DIR_ENV) {
            self.active_dir = Some(PathBuf::from(active_dir));
        }
        if let Some(scratch_dir) = non_empty(SCRATCH_DIR_ENV) {
            self.scratch_dir = Some(PathBuf::from(scratch_dir));
        }
        if let Some(port) = non_empty(PORT_ENV).and_then(|value| value.trim().parse().ok()) {
            self.port = port;
        }
        if let Some(debug) = non_empty(DEBUG_ENV) {
            self.debug_logging = matches!(
                debug.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn root_prefix(&self) -> String {
        self.archive_root_prefix
            .clone()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| default_root_prefix(&self.repository))
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            program: self.toolchain_program.clone(),
            install_args: self.install_args.clone(),
            build_args: self.build_args.clone(),
        }
    }

    /// Whole-request limit for the release lookup; archive downloads only use
    /// it as a per-read stall limit.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
