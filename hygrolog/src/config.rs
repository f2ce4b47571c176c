//! Configuration for the sensor log and its maintenance schedule.
//!
//! Configuration can be built in code, loaded from a JSON file, or both
//! (the daemon loads a file and then applies command-line overrides).
//! Durations are written as whole seconds in JSON:
//!
//! ```json
//! {
//!   "path": "/data/aht30.csv",
//!   "retention": 604800,
//!   "sample_interval": 60,
//!   "compact_interval": 21600
//! }
//! ```
//!
//! Any field left out takes its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default log file name.
pub const DEFAULT_LOG_PATH: &str = "aht30.csv";

/// Keep a rolling 7 days of history.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// One sample per minute.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

/// Compact every 6 hours to limit flash rewrites.
pub const DEFAULT_COMPACT_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Log location, retention horizon, and scheduling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Path of the log file.
    pub path: PathBuf,

    /// Minimum age of history to keep. Compaction drops anything older.
    #[serde(with = "duration_secs")]
    pub retention: Duration,

    /// Time between sensor samples.
    #[serde(with = "duration_secs")]
    pub sample_interval: Duration,

    /// Minimum uptime between compactions.
    #[serde(with = "duration_secs")]
    pub compact_interval: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            retention: DEFAULT_RETENTION,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            compact_interval: DEFAULT_COMPACT_INTERVAL,
        }
    }
}

impl LogConfig {
    /// Loads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Load`] if the file cannot be read
    /// - [`ConfigError::Parse`] if it is not valid configuration JSON
    /// - [`ConfigError::Invalid`] if a value is out of range
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(ConfigError::Invalid { reason }.into()) };

        if self.path.as_os_str().is_empty() {
            return invalid("log path must not be empty".to_string());
        }
        for (name, value) in [
            ("retention", self.retention),
            ("sample_interval", self.sample_interval),
            ("compact_interval", self.compact_interval),
        ] {
            if value.is_zero() {
                return invalid(format!("{name} must be greater than zero"));
            }
        }
        if self.retention < self.sample_interval {
            return invalid(format!(
                "retention {:?} is shorter than sample_interval {:?}",
                self.retention, self.sample_interval
            ));
        }
        if self.compact_interval < self.sample_interval {
            return invalid(format!(
                "compact_interval {:?} is shorter than sample_interval {:?}",
                self.compact_interval, self.sample_interval
            ));
        }
        Ok(())
    }

    /// Retention horizon in whole seconds.
    pub fn retention_secs(&self) -> i64 {
        i64::try_from(self.retention.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Parses a human-readable duration such as `"90s"`, `"30m"`, `"6h"` or `"7d"`.
///
/// A bare number is taken as seconds.
///
/// # Errors
///
/// Returns a description of the problem if the string is empty, the number
/// does not parse, or the unit is unknown.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num_str, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], &s[i..]),
        _ => (s, "s"),
    };
    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid duration '{s}': {e}"))?;

    let secs = match unit {
        "s" => Some(num),
        "m" => num.checked_mul(60),
        "h" => num.checked_mul(3600),
        "d" => num.checked_mul(86_400),
        _ => return Err(format!("unknown duration unit '{unit}'; use s, m, h, or d")),
    };

    secs.map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Formats a duration using the largest whole unit (`7d`, `6h`, `90s`).
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 86_400 && secs.is_multiple_of(86_400) {
        format!("{}d", secs / 86_400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
