//! Platform directories and log-file housekeeping for scriptdap.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::PlatformError;
pub use logging::{LogRotation, DEFAULT_LOG_FILE_NAME};
pub use paths::{DefaultPaths, PlatformPaths};
