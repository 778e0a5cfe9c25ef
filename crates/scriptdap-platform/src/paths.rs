use std::path::PathBuf;

use crate::error::PlatformError;

const APP_DIR: &str = "scriptdap";

/// Standard directories used by the adapter.
pub trait PlatformPaths: Send + Sync {
    /// Configuration directory (`~/.config/scriptdap`).
    fn config_dir(&self) -> PathBuf;
    /// Data directory (`~/.local/share/scriptdap`).
    fn data_dir(&self) -> PathBuf;
    /// Log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// The user's home directory.
    fn home_dir(&self) -> PathBuf;
}

/// [`PlatformPaths`] rooted at the user's home directory.
#[derive(Debug, Clone)]
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self::with_home(home))
    }

    /// Paths under an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}
