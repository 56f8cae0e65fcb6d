use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uplift_platform::AppPaths;

#[cfg(debug_assertions)]
const STDERR_COLORS: ColorChoice = ColorChoice::Auto;
#[cfg(not(debug_assertions))]
const STDERR_COLORS: ColorChoice = ColorChoice::Never;

/// Append-only log file, reopened when it disappears underneath the running
/// service.
struct LogFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl LogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let handle = open_append(&path)?;
        Ok(Self {
            path,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn with_handle<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match slot.take() {
            Some(file) if self.path.exists() => slot.insert(file),
            _ => slot.insert(open_append(&self.path)?),
        };
        op(file)
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_handle(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_handle(|file| file.flush())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Keep roughly the newest half of an oversized log, cut at a line boundary.
fn trim_oversized(log_path: &Path, max_bytes: u64) -> io::Result<()> {
    if std::fs::metadata(log_path)?.len() <= max_bytes {
        return Ok(());
    }
    let contents = std::fs::read(log_path)?;
    let midpoint = contents.len() / 2;
    let start = contents[midpoint..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(midpoint, |offset| midpoint + offset + 1);
    std::fs::write(log_path, &contents[start..])
}

fn default_log_path() -> io::Result<PathBuf> {
    let paths = AppPaths::new().map_err(io::Error::other)?;
    paths.ensure_dirs()?;
    Ok(paths.log_file())
}

/// The stderr logger is always present so the supervisor's journal sees every
/// record; the file logger is added on top when its path can be opened.
fn build_loggers(
    log_path: io::Result<PathBuf>,
    max_log_size: u64,
    config: &Config,
) -> (Vec<Box<dyn SharedLogger>>, io::Result<PathBuf>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Stderr,
        STDERR_COLORS,
    )];

    let file = log_path.and_then(|path| {
        let _ = trim_oversized(&path, max_log_size);
        let writer = LogFile::open(path.clone())?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, config.clone(), writer));
        Ok(path)
    });

    (loggers, file)
}

pub fn init_logging(debug_enabled: bool, max_log_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("uplift")
        .build();

    let (loggers, file) = build_loggers(default_log_path(), max_log_size, &config);
    let _ = CombinedLogger::init(loggers);
    set_debug_logging(debug_enabled);

    match file {
        Ok(path) => log::info!("Logging to stderr and {}", path.display()),
        Err(error) => log::warn!("File logging unavailable, logging to stderr only: {error}"),
    }
}

/// Debug records are dropped unless enabled; info and above always pass.
pub fn set_debug_logging(enabled: bool) {
    if enabled {
        log::set_max_level(LevelFilter::Debug);
    } else {
        log::set_max_level(LevelFilter::Info);
    }
}
