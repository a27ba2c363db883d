//! File-based logging bootstrap.
//!
//! The core only ever talks to the [`log`] facade; this module wires that
//! facade to a line-oriented file sink for callers that want one. Nothing
//! here is required: embedders with their own logging setup can skip it
//! entirely and install whatever `log` backend they prefer.

use std::fs::{self, File};
use std::path::Path;

use env_logger::{Builder, Env};

use crate::{ErrorKind, Result};

/// Default directory for log files
pub const DEFAULT_LOG_DIR: &str = "./logs";

/// Name of the log file inside the log directory
const LOG_FILE: &str = "prospector.log";

/// Initialize logging into a file under the given directory.
///
/// The directory is created if it does not exist and the log file is
/// appended to across runs. Each line is prefixed with a millisecond
/// timestamp and the log level. The default filter is `info`; `RUST_LOG`
/// overrides it.
///
/// Must be called at most once per process, before any other `log`
/// backend is installed.
///
/// # Errors
///
/// Returns an `Err` if the directory or the file cannot be created, or
/// if a logger is already installed.
pub fn init_file_logging(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| ErrorKind::CreateLogDir(e, dir.to_path_buf()))?;

    let path = dir.join(LOG_FILE);
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ErrorKind::OpenLogFile(e, path))?;

    Builder::from_env(Env::default().filter_or("RUST_LOG", "info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    Ok(())
}
