//! Log-file placement, size-based rotation and level names.
//!
//! The `tracing-subscriber` setup lives in the binary; this module only
//! prepares the file it writes to.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PlatformError;
use crate::paths::PlatformPaths;

/// File name used inside the platform log directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "scriptdap.log";

/// Size-based rotation policy: `x.log` → `x.log.1` → … → `x.log.<keep>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    /// Rotate once the live file reaches this many bytes.
    pub max_size: u64,
    /// Rotated files kept; older ones are deleted.
    pub keep: u32,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl LogRotation {
    /// Rotate `log_path` if it is at least `max_size` bytes.
    ///
    /// A missing file is not an error.
    pub fn rotate(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if size < self.max_size {
            return Ok(false);
        }
        if self.keep == 0 {
            fs::remove_file(log_path)?;
            return Ok(true);
        }

        let oldest = numbered(log_path, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.keep).rev() {
            let from = numbered(log_path, index);
            if from.exists() {
                fs::rename(&from, numbered(log_path, index + 1))?;
            }
        }
        fs::rename(log_path, numbered(log_path, 1))?;
        Ok(true)
    }
}

/// Choose the log file, create its directory and rotate it.
///
/// `configured` wins over `<log_dir>/scriptdap.log`.
pub fn prepare_log_file(
    paths: &dyn PlatformPaths,
    configured: Option<&Path>,
    rotation: LogRotation,
) -> Result<PathBuf, PlatformError> {
    let path = configured
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.log_dir().join(DEFAULT_LOG_FILE_NAME));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PlatformError::io(parent, e))?;
    }
    rotation
        .rotate(&path)
        .map_err(|e| PlatformError::io(&path, e))?;
    Ok(path)
}

fn numbered(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
