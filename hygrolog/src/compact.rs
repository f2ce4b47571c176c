//! Retention compaction: rewrite the log without expired records.
//!
//! Compaction is copy-and-swap. Surviving records are re-encoded into a
//! sibling file named `<log>.tmp`, that file is synced and closed, and only
//! then renamed over the original. Lines that fail to decode are not carried
//! forward, so every compaction doubles as a repair pass.
//!
//! # Crash Safety
//!
//! The original file is never removed before the replacement is complete.
//! On POSIX filesystems `rename` replaces the target atomically, so a crash
//! at any point leaves either the old log or the new one. Filesystems without
//! atomic rename-over may briefly expose neither; that window is accepted.
//!
//! Compaction rewrites the whole file and wears flash accordingly, which is
//! why [`crate::scheduler::Scheduler`] runs it on a coarse timer rather than
//! after every append.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::clock;
use crate::error::{CompactionError, Result};
use crate::log::AppendLog;

/// Suffix appended to the log file name for the replacement file.
pub const TEMP_SUFFIX: &str = ".tmp";

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Records copied into the new log.
    pub kept: usize,
    /// Valid records dropped for being older than the cutoff.
    pub expired: usize,
    /// Malformed lines dropped.
    pub malformed: usize,
}

impl CompactionReport {
    /// Returns `true` if the rewrite removed anything.
    pub fn changed(&self) -> bool {
        self.expired > 0 || self.malformed > 0
    }
}

/// Returns the path of the replacement file used while compacting `log_path`.
pub fn temp_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.file_name().unwrap_or_default().to_os_string();
    name.push(TEMP_SUFFIX);
    log_path.with_file_name(name)
}

/// Rewrites `log` keeping only valid records with `timestamp >= cutoff`.
///
/// Relative order of surviving records is preserved. Running it twice with
/// the same cutoff leaves the same file as running it once.
///
/// # Errors
///
/// - [`CompactionError::TempCreate`] / [`CompactionError::TempWrite`] if the
///   replacement cannot be written
/// - [`CompactionError::SourceRead`] if the log cannot be read to the end
/// - [`CompactionError::Swap`] if the final rename fails
///
/// In every error case the original log is left untouched and the
/// replacement file is removed.
pub fn compact_older_than(log: &AppendLog, cutoff: i64) -> Result<CompactionReport> {
    let tmp = temp_path(log.path());

    let result = write_replacement(log, &tmp, cutoff).and_then(|report| {
        swap_into_place(&tmp, log.path())?;
        Ok(report)
    });

    match &result {
        Ok(report) => tracing::info!(
            path = %log.path().display(),
            cutoff,
            kept = report.kept,
            expired = report.expired,
            malformed = report.malformed,
            "compacted log"
        ),
        Err(e) => {
            tracing::error!(path = %log.path().display(), error = %e, "compaction aborted");
            let _ = fs::remove_file(&tmp);
        }
    }

    result
}

/// Drops records older than `now - retention`.
///
/// Does nothing and returns `Ok(None)` if `now` is not a real time: a cutoff
/// computed from an unsynchronized clock would delete the whole history.
///
/// # Errors
///
/// Same as [`compact_older_than`].
pub fn compact_retention(
    log: &AppendLog,
    now: i64,
    retention_secs: i64,
) -> Result<Option<CompactionReport>> {
    if !clock::is_real(now) {
        tracing::warn!(now, "clock not synchronized; skipping compaction");
        return Ok(None);
    }
    compact_older_than(log, now.saturating_sub(retention_secs)).map(Some)
}

fn write_replacement(log: &AppendLog, tmp: &Path, cutoff: i64) -> Result<CompactionReport> {
    let write_err = |e| CompactionError::TempWrite {
        path: tmp.to_path_buf(),
        source: e,
    };

    // Open the source first so a missing or unreadable log never creates a
    // replacement.
    let mut records = log.records()?;

    // truncate(true) also discards a stale file from an interrupted run.
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp)
        .map_err(|e| CompactionError::TempCreate {
            path: tmp.to_path_buf(),
            source: e,
        })?;
    let mut out = BufWriter::new(file);

    let mut report = CompactionReport::default();
    for record in records.by_ref() {
        if record.timestamp >= cutoff {
            out.write_all(record.encode().as_bytes()).map_err(write_err)?;
            report.kept += 1;
        } else {
            report.expired += 1;
        }
    }
    report.malformed = records.skipped();

    if let Some(e) = records.take_error() {
        return Err(CompactionError::SourceRead {
            path: log.path().to_path_buf(),
            source: e,
        }
        .into());
    }

    let file = out.into_inner().map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;
    Ok(report)
}

fn swap_into_place(tmp: &Path, target: &Path) -> Result<()> {
    fs::rename(tmp, target).map_err(|e| CompactionError::Swap {
        from: tmp.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    })?;

    // Persist the directory entry change. Not every platform can open a
    // directory for syncing, so failure here is only logged.
    if let Some(dir) = target.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = File::open(dir).and_then(|d| d.sync_all())
    {
        tracing::debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
    Ok(())
}
