//! # hygrolog
//!
//! Durable time-series log for a temperature/humidity sensor appliance.
//!
//! hygrolog keeps a bounded window of sensor history in a single text file
//! on local flash, trims it with a periodic copy-and-swap compaction, and
//! answers "latest" and "since" queries by streaming the file, so memory use
//! stays flat however long the history is.
//!
//! ## Key Properties
//!
//! - One record per line, append order preserved, never re-sorted
//! - Each append is its own open/write/sync/close cycle
//! - Malformed lines are skipped on read and dropped on compaction
//! - Nothing that depends on wall-clock time runs before the clock is synced
//! - Single writer; no background threads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hygrolog::{AppendLog, Record, compact, query};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = AppendLog::open("./aht30.csv")?;
//!
//! log.append(&Record::new(1_700_000_100, 21.50, 55.25))?;
//! log.append(&Record::new(1_700_003_700, 22.00, 50.00))?;
//!
//! assert_eq!(query::latest(&log)?.map(|r| r.timestamp), Some(1_700_003_700));
//! assert_eq!(query::since(&log, 1_700_002_000)?.count(), 1);
//!
//! compact::compact_older_than(&log, 1_700_003_700)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`record`] — Line codec for a single observation
//! - [`log`] — Append-only log file and its streaming reader
//! - [`compact`] — Retention compaction (copy-and-swap)
//! - [`query`] — Latest/since queries and history window resolution
//! - [`response`] — JSON wire format and streaming array writer
//! - [`scheduler`] — Sampling and compaction cadence
//! - [`clock`] — Wall-clock interface and the real-time rule
//! - [`sensor`] — Sensor interface and sample validation
//! - [`config`] — Configuration
//! - [`error`] — Error types

pub mod clock;
pub mod compact;
pub mod config;
pub mod error;
pub mod log;
pub mod query;
pub mod record;
pub mod response;
pub mod scheduler;
pub mod sensor;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use compact::CompactionReport;
pub use config::LogConfig;
pub use error::{HygroError, Result};
pub use log::{AppendLog, LogStats};
pub use query::HistoryParams;
pub use record::Record;
pub use scheduler::{SampleOutcome, Scheduler, TickOutcome};
pub use sensor::{Sample, Sensor};
