//! Logging setup for the decoration crates with file output and optional stdout.
//!
//! Logs always go to a file at `warn` level, or at the level selected through the
//! environment. Stdout logging is enabled when `STOAT_LOG` or `RUST_LOG` is set, or
//! in debug builds.
//!
//! ## Environment Variables
//!
//! 1. **`STOAT_LOG`** (highest priority) - a bare level applies to every stoat crate,
//!    anything else is used as a full filter directive
//! 2. **`RUST_LOG`** - Standard tracing environment variable
//! 3. **Default** - `warn` globally, `info` for stoat crates
//!
//! ## Log File Location
//!
//! Default: `<data_local_dir>/stoat/logs/stoat-<pid>.log`
//! - macOS: `~/Library/Application Support/stoat/logs/stoat-12345.log`
//! - Linux: `~/.local/share/stoat/logs/stoat-12345.log`
//!
//! Override with [`LogConfig::log_file_path`] or `STOAT_LOG_FILE`. A path with an
//! extension names the file, anything else names the directory.

use std::{
    env,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Crates whose targets a bare `STOAT_LOG` level applies to.
const STOAT_TARGETS: &[&str] = &["stoat_decoration", "stoat_log"];

/// Returned from [`init`]; must be held alive to ensure log file flushing.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

#[derive(Debug, Default, Clone)]
pub struct LogConfig {
    pub log_file_path: Option<PathBuf>,
}

/// Initialize logging.
///
/// The returned [`LogGuard`] must be held for the lifetime of the program. Dropping
/// it flushes and stops the background file writer.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: LogConfig) -> Result<LogGuard, BoxError> {
    let override_path = config
        .log_file_path
        .or_else(|| env::var_os("STOAT_LOG_FILE").map(PathBuf::from));
    let (log_dir, filename) = resolve_log_path(override_path);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(create_file_filter());

    let stdout_enabled =
        env::var("STOAT_LOG").is_ok() || env::var("RUST_LOG").is_ok() || cfg!(debug_assertions);
    let stdout_layer = stdout_enabled.then(|| fmt::layer().with_filter(create_filter()));

    Registry::default()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    tracing::debug!("Logging to {}", log_dir.join(&filename).display());
    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

/// Initialize stdout-only logging for tests.
///
/// Safe to call from every test: later calls are ignored.
pub fn test() {
    let _ = fmt()
        .with_env_filter(create_filter())
        .with_test_writer()
        .try_init();
}

/// Split an override into directory and file name, or fall back to the data dir.
fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("stoat-{}.log", std::process::id());

    match override_path {
        Some(path) if path.extension().is_some() => {
            let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            (dir, name)
        },
        Some(dir) => (dir, filename),
        None => {
            let dir = dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("stoat")
                .join("logs");
            (dir, filename)
        },
    }
}

/// File filter: the environment's filter if one is set, `warn` otherwise.
fn create_file_filter() -> EnvFilter {
    if env::var("STOAT_LOG").is_ok() || env::var("RUST_LOG").is_ok() {
        return create_filter();
    }
    EnvFilter::new("warn")
}

/// `STOAT_LOG` > `RUST_LOG` > defaults.
fn create_filter() -> EnvFilter {
    if let Ok(stoat_log) = env::var("STOAT_LOG") {
        return EnvFilter::new(expand_stoat_log(&stoat_log));
    }
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }
    EnvFilter::new(directives("info"))
}

/// Expand a bare level to every stoat target; pass directives through as-is.
fn expand_stoat_log(stoat_log: &str) -> String {
    if stoat_log.contains(['=', ':', ',']) {
        return stoat_log.to_string();
    }
    directives(stoat_log)
}

fn directives(level: &str) -> String {
    let mut out = String::from("warn");
    for target in STOAT_TARGETS {
        out.push_str(&format!(",{target}={level}"));
    }
    out
}
