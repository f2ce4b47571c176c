//! Query engine for reading history back out of the log.
//!
//! Two queries are supported, both built on a single forward scan of the
//! log and both in constant memory:
//!
//! - [`latest`] - the most recently appended valid record
//! - [`since`] - every valid record with `timestamp >= threshold`, streamed
//!   lazily in append order
//!
//! The request layer describes a history window with [`HistoryParams`];
//! [`resolve_threshold`] turns that into the timestamp passed to [`since`].
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use hygrolog::log::AppendLog;
//! use hygrolog::query::{self, HistoryParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = AppendLog::open("./aht30.csv")?;
//!
//! let params = HistoryParams::from_query("days=2");
//! let threshold = query::resolve_threshold(&params, 1_700_200_000, 7 * 86_400);
//! for record in query::since(&log, threshold)? {
//!     println!("{} {:.2} {:.2}", record.timestamp, record.temperature_c, record.humidity_pct);
//! }
//! # Ok(())
//! # }
//! ```

use crate::clock;
use crate::error::Result;
use crate::log::{AppendLog, Records};
use crate::record::Record;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Window used when `days` is given but not positive.
pub const DEFAULT_HISTORY_DAYS: i64 = 7;

/// Returns the last valid record in the log, or `None` if there is none.
///
/// Malformed lines at the end of the log are skipped, so the result is the
/// last record that decodes, not necessarily the last line.
///
/// # Errors
///
/// Returns an error if the log exists but cannot be read.
pub fn latest(log: &AppendLog) -> Result<Option<Record>> {
    let mut records = log.records()?;
    let last = records.by_ref().last();
    records.finish()?;
    Ok(last)
}

/// Streams records with `timestamp >= threshold` in append order.
///
/// Nothing is read until the returned iterator is advanced.
///
/// # Errors
///
/// Returns an error if the log exists but cannot be opened.
pub fn since(log: &AppendLog, threshold: i64) -> Result<Since> {
    Ok(Since {
        records: log.records()?,
        threshold,
    })
}

/// Lazy, single-pass iterator returned by [`since`].
///
/// The iterator cannot be restarted; run [`since`] again for a fresh scan.
#[derive(Debug)]
pub struct Since {
    records: Records,
    threshold: i64,
}

impl Since {
    /// The threshold this scan filters on.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.records.skipped()
    }

    /// Consumes the iterator, reporting whether the scan hit a read error.
    ///
    /// # Errors
    ///
    /// Returns an error if iteration stopped because the log became
    /// unreadable.
    pub fn finish(self) -> Result<()> {
        self.records.finish()
    }
}

impl Iterator for Since {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let threshold = self.threshold;
        self.records.find(|r| r.timestamp >= threshold)
    }
}

/// History window requested by a client.
///
/// `since` takes precedence over `days`. With neither, the window is the
/// full retention horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryParams {
    /// Explicit epoch-seconds threshold.
    pub since: Option<i64>,
    /// Window size in days, counted back from now.
    pub days: Option<i64>,
}

impl HistoryParams {
    /// Parses `since` and `days` out of a URL query string.
    ///
    /// Values are read like C's `atol`: an optional sign, then leading
    /// digits, with anything after them ignored. So `since=123abc` is 123,
    /// `since=abc` is 0 ("from the beginning") and `days=abc` falls back to
    /// [`DEFAULT_HISTORY_DAYS`]. Out-of-range values saturate.
    /// Unknown keys are ignored. If a key repeats, the first one wins.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in query
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        {
            match key {
                "since" if params.since.is_none() => params.since = Some(lenient_int(value)),
                "days" if params.days.is_none() => params.days = Some(lenient_int(value)),
                _ => {}
            }
        }
        params
    }
}

fn lenient_int(value: &str) -> i64 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative { -magnitude } else { magnitude }
}

/// Resolves a [`HistoryParams`] into the threshold for [`since`].
///
/// - explicit `since`: used verbatim
/// - `days = d`: `now - d * 86400` (with `d <= 0` meaning 7), or 0 if `now`
///   is not a real time
/// - neither: as if `days` were the retention window in days
pub fn resolve_threshold(params: &HistoryParams, now: i64, retention_secs: i64) -> i64 {
    if let Some(since) = params.since {
        return since;
    }

    let window_secs = match params.days {
        Some(days) => {
            let days = if days <= 0 { DEFAULT_HISTORY_DAYS } else { days };
            days.saturating_mul(SECONDS_PER_DAY)
        }
        None => retention_secs,
    };

    if clock::is_real(now) {
        now.saturating_sub(window_secs)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_100_000;
    const WEEK: i64 = 7 * SECONDS_PER_DAY;

    fn log_with(lines: &str) -> (tempfile::TempDir, AppendLog) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, lines).unwrap();
        let log = AppendLog::open(path).unwrap();
        (dir, log)
    }

    #[test]
    fn test_latest_empty_log() {
        let (_dir, log) = log_with("");
        assert_eq!(latest(&log).unwrap(), None);
    }

    #[test]
    fn test_latest_only_malformed() {
        let (_dir, log) = log_with("junk\n1,2\nnope,nope,nope\n");
        assert_eq!(latest(&log).unwrap(), None);
    }

    #[test]
    fn test_latest_skips_trailing_garbage() {
        let (_dir, log) = log_with("1700000100,21.50,55.25\n1700000160,22.00,50.00\n@@@@@@\n");
        assert_eq!(latest(&log).unwrap(), Some(Record::new(1_700_000_160, 22.0, 50.0)));
    }

    #[test]
    fn test_latest_is_last_appended_not_max_timestamp() {
        let (_dir, log) = log_with("1700000900,21.50,55.25\n1700000100,22.00,50.00\n");
        assert_eq!(latest(&log).unwrap().map(|r| r.timestamp), Some(1_700_000_100));
    }

    #[test]
    fn test_since_filters_inclusive() {
        let (_dir, log) = log_with(
            "1700000100,21.50,55.25\n1700000200,21.60,55.00\n1700000300,21.70,54.75\n",
        );
        let ts: Vec<_> = since(&log, 1_700_000_200).unwrap().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1_700_000_200, 1_700_000_300]);
    }

    #[test]
    fn test_since_keeps_append_order() {
        let (_dir, log) = log_with(
            "1700000300,21.50,55.25\n1700000100,21.60,55.00\n1700000200,21.70,54.75\n",
        );
        let ts: Vec<_> = since(&log, 1_700_000_150).unwrap().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1_700_000_300, 1_700_000_200]);
    }

    #[test]
    fn test_since_reports_skipped() {
        let (_dir, log) = log_with("1700000100,21.50,55.25\nbad\n1700000200,21.60,55.00\n");
        let mut iter = since(&log, 0).unwrap();
        assert_eq!(iter.by_ref().count(), 2);
        assert_eq!(iter.skipped(), 1);
        assert!(iter.finish().is_ok());
    }

    #[test]
    fn test_from_query() {
        assert_eq!(HistoryParams::from_query(""), HistoryParams::default());
        assert_eq!(
            HistoryParams::from_query("since=1700000000"),
            HistoryParams {
                since: Some(1_700_000_000),
                days: None
            }
        );
        assert_eq!(
            HistoryParams::from_query("days=3&foo=bar"),
            HistoryParams {
                since: None,
                days: Some(3)
            }
        );
        assert_eq!(HistoryParams::from_query("since=abc").since, Some(0));
        assert_eq!(HistoryParams::from_query("days").days, Some(0));
        assert_eq!(HistoryParams::from_query("days=2&days=5").days, Some(2));
    }

    #[test]
    fn test_from_query_reads_leading_digits() {
        assert_eq!(HistoryParams::from_query("since=123abc").since, Some(123));
        assert_eq!(HistoryParams::from_query("days=2d").days, Some(2));
        assert_eq!(HistoryParams::from_query("days=-3x").days, Some(-3));
        assert_eq!(HistoryParams::from_query("since=+42").since, Some(42));
        assert_eq!(HistoryParams::from_query("since=-").since, Some(0));
        assert_eq!(
            HistoryParams::from_query("since=99999999999999999999999").since,
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_resolve_explicit_since_wins() {
        let params = HistoryParams {
            since: Some(42),
            days: Some(1),
        };
        assert_eq!(resolve_threshold(&params, NOW, WEEK), 42);
        // Verbatim even when the clock is unreal.
        assert_eq!(resolve_threshold(&params, 0, WEEK), 42);
    }

    #[test]
    fn test_resolve_days() {
        let params = HistoryParams {
            since: None,
            days: Some(2),
        };
        assert_eq!(resolve_threshold(&params, NOW, WEEK), NOW - 2 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_resolve_non_positive_days_means_week() {
        for days in [0, -5] {
            let params = HistoryParams {
                since: None,
                days: Some(days),
            };
            assert_eq!(resolve_threshold(&params, NOW, 3 * SECONDS_PER_DAY), NOW - WEEK);
        }
    }

    #[test]
    fn test_resolve_days_with_unreal_clock_is_zero() {
        let params = HistoryParams {
            since: None,
            days: Some(2),
        };
        assert_eq!(resolve_threshold(&params, 1_000, WEEK), 0);
    }

    #[test]
    fn test_resolve_default_is_retention_window() {
        let params = HistoryParams::default();
        assert_eq!(resolve_threshold(&params, NOW, 3 * SECONDS_PER_DAY), NOW - 3 * SECONDS_PER_DAY);
        assert_eq!(resolve_threshold(&params, 0, WEEK), 0);
    }

    #[test]
    fn test_resolve_huge_days_saturates() {
        let params = HistoryParams {
            since: None,
            days: Some(i64::MAX),
        };
        assert_eq!(resolve_threshold(&params, NOW, WEEK), NOW.saturating_sub(i64::MAX));
    }
}
