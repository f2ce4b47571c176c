//! Error types for the hygrolog sensor log.
//!
//! Only genuine failures live here. A malformed stored line or an
//! unsynchronized clock is an expected condition and is reported through
//! counters and outcome enums instead.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all hygrolog operations.
#[derive(Error, Debug)]
pub enum HygroError {
    /// Error reading from or appending to the log file.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Error while rewriting the log during retention compaction.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Error loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors that can occur while opening, appending to, or scanning the log.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log file (or its parent directory) could not be opened or created.
    #[error("failed to open log '{}': {source}", path.display())]
    Open {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or syncing an appended record failed.
    #[error("failed to append to log '{}': {source}", path.display())]
    Write {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the log failed part-way through a scan.
    #[error("failed to read log '{}': {source}", path.display())]
    Read {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Truncating a torn trailing record failed.
    #[error("failed to repair torn tail of log '{}': {source}", path.display())]
    Repair {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during retention compaction.
///
/// Whatever the variant, the original log is left in place.
#[derive(Error, Debug)]
pub enum CompactionError {
    /// The replacement file could not be created.
    #[error("failed to create compaction file '{}': {source}", path.display())]
    TempCreate {
        /// The temporary file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or syncing the replacement file failed.
    #[error("failed to write compaction file '{}': {source}", path.display())]
    TempWrite {
        /// The temporary file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source log could not be read to the end.
    #[error("failed to read source log '{}' during compaction: {source}", path.display())]
    SourceRead {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Renaming the replacement over the original failed.
    #[error("failed to replace '{}' with '{}': {source}", to.display(), from.display())]
    Swap {
        /// The temporary file path.
        from: PathBuf,
        /// The log file path.
        to: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Load {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::config::LogConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what is invalid.
        reason: String,
    },
}

/// Type alias for `Result<T, HygroError>`.
pub type Result<T> = std::result::Result<T, HygroError>;
