//! Append-only record log on local storage.
//!
//! The log is a single text file holding one encoded [`Record`] per line in
//! append order. It has exactly two mutation paths: [`AppendLog::append`]
//! here, and the copy-and-swap rewrite in [`crate::compact`].
//!
//! # Durability
//!
//! Each append is its own open/write/sync/close cycle, so a crash can lose
//! at most the record being written. A record cut off mid-write leaves a
//! tail without a trailing newline; [`AppendLog::open`] truncates such a tail
//! so the next append starts on a fresh line.
//!
//! # Reading
//!
//! [`AppendLog::records`] is the single read primitive. It streams the file
//! one line at a time and silently skips anything that does not decode. A
//! final line without its newline is an append that never finished and is
//! skipped too, even if what survived happens to parse. At most
//! [`MAX_LINE_LEN`] bytes of a line are buffered, so memory use does not grow
//! with the size of the log or of any corrupt region in it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::error::{LogError, Result};
use crate::record::{MAX_LINE_LEN, Record};

/// Handle to the on-disk record log.
///
/// The handle only remembers the path; every operation opens and closes the
/// file itself. Only one writer may use a given path at a time.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

/// Summary of the log contents, as reported by [`AppendLog::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogStats {
    /// Number of decodable records.
    pub records: usize,
    /// Number of non-empty lines that failed to decode.
    pub malformed: usize,
    /// File size in bytes.
    pub bytes: u64,
    /// Smallest timestamp among valid records.
    pub oldest: Option<i64>,
    /// Largest timestamp among valid records.
    pub newest: Option<i64>,
}

impl AppendLog {
    /// Opens the log at `path`, creating an empty one on first boot.
    ///
    /// Missing parent directories are created. A torn trailing record left
    /// by an interrupted append is truncated away.
    ///
    /// # Errors
    ///
    /// - [`LogError::Open`] if the directory or file cannot be created
    /// - [`LogError::Repair`] if a torn tail cannot be truncated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| LogError::Open {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if !path.exists() {
            File::create(&path).map_err(|e| LogError::Open {
                path: path.clone(),
                source: e,
            })?;
            tracing::info!(path = %path.display(), "created empty log");
        }

        let log = Self { path };
        log.repair_torn_tail()?;
        Ok(log)
    }

    /// Opens an existing log for reading only.
    ///
    /// Unlike [`AppendLog::open`] this never creates the file and never
    /// repairs it, so inspecting a log leaves it byte-for-byte unchanged. A
    /// torn tail is still skipped by the readers.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Open`] if the file does not exist or is not a
    /// regular file.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Self { path }),
            Ok(_) => Err(LogError::Open {
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                path,
            }
            .into()),
            Err(e) => Err(LogError::Open { path, source: e }.into()),
        }
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record to the end of the log.
    ///
    /// The file is opened, written, synced and closed before this returns.
    /// A fragment left behind by an earlier failed append is cut off first,
    /// so the new record always starts on its own line. If this write fails
    /// part-way, the file is truncated back to its previous length.
    ///
    /// # Errors
    ///
    /// - [`LogError::Open`] if the file cannot be opened for append
    /// - [`LogError::Repair`] if a leftover fragment cannot be removed
    /// - [`LogError::Write`] if writing or syncing fails
    pub fn append(&self, record: &Record) -> Result<()> {
        let mut line = record.encode();
        if self.repair_torn_tail()? == Tail::Unterminated {
            // Too long to be a record; close it off as its own bad line.
            line.insert(0, '\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LogError::Open {
                path: self.path.clone(),
                source: e,
            })?;
        let start = file
            .metadata()
            .map_err(|e| LogError::Open {
                path: self.path.clone(),
                source: e,
            })?
            .len();

        let written = file
            .write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data());

        if let Err(e) = written {
            if let Err(rollback) = file.set_len(start).and_then(|()| file.sync_data()) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "could not roll back partial append"
                );
            }
            return Err(LogError::Write {
                path: self.path.clone(),
                source: e,
            }
            .into());
        }

        Ok(())
    }

    /// Returns a streaming iterator over all valid records in append order.
    ///
    /// A log file that does not exist reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Open`] if the file exists but cannot be opened.
    pub fn records(&self) -> Result<Records> {
        match File::open(&self.path) {
            Ok(file) => Ok(Records::new(self.path.clone(), Some(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Records::new(self.path.clone(), None))
            }
            Err(e) => Err(LogError::Open {
                path: self.path.clone(),
                source: e,
            }
            .into()),
        }
    }

    /// Calls `visitor` for each valid record in append order.
    ///
    /// The visitor may stop the scan early by returning
    /// [`ControlFlow::Break`]. The file is closed on return either way.
    ///
    /// # Errors
    ///
    /// - [`LogError::Open`] if the file cannot be opened
    /// - [`LogError::Read`] if reading fails part-way through
    pub fn for_each<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(Record) -> ControlFlow<()>,
    {
        let mut records = self.records()?;
        for record in records.by_ref() {
            if visitor(record).is_break() {
                return Ok(());
            }
        }
        records.finish()
    }

    /// Scans the whole log and summarizes it.
    ///
    /// # Errors
    ///
    /// Same as [`AppendLog::for_each`].
    pub fn stats(&self) -> Result<LogStats> {
        let mut stats = LogStats {
            bytes: fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
            ..LogStats::default()
        };

        let mut records = self.records()?;
        for record in records.by_ref() {
            stats.records += 1;
            stats.oldest = Some(stats.oldest.map_or(record.timestamp, |t| t.min(record.timestamp)));
            stats.newest = Some(stats.newest.map_or(record.timestamp, |t| t.max(record.timestamp)));
        }
        stats.malformed = records.skipped();
        records.finish()?;

        Ok(stats)
    }

    /// Truncates bytes after the last newline, if any.
    fn repair_torn_tail(&self) -> Result<Tail> {
        let repair_err = |e: io::Error| LogError::Repair {
            path: self.path.clone(),
            source: e,
        };

        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Tail::Clean),
            Err(e) => return Err(repair_err(e).into()),
        };
        if len == 0 {
            return Ok(Tail::Clean);
        }

        // A torn record is at most one line long; only the tail needs reading.
        let tail_len = len.min(MAX_LINE_LEN as u64 * 2);
        let mut file = File::open(&self.path).map_err(repair_err)?;
        let tail = read_tail(&mut file, tail_len).map_err(repair_err)?;

        let keep = match tail.iter().rposition(|&b| b == b'\n') {
            Some(pos) => len - tail_len + pos as u64 + 1,
            None if tail_len == len => 0,
            // No newline near the end of a long file: the tail is garbage
            // longer than any record. Readers skip it; compaction drops it.
            None => {
                tracing::warn!(path = %self.path.display(), "unterminated garbage at end of log");
                return Ok(Tail::Unterminated);
            }
        };

        if keep == len {
            return Ok(Tail::Clean);
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(repair_err)?;
        file.set_len(keep).map_err(repair_err)?;
        file.sync_all().map_err(repair_err)?;

        tracing::warn!(
            path = %self.path.display(),
            bytes = len - keep,
            "truncated torn record at end of log"
        );
        Ok(Tail::Truncated)
    }
}

/// State of the end of the log after [`AppendLog::repair_torn_tail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Empty, or ends with a newline.
    Clean,
    /// A torn record was cut off.
    Truncated,
    /// Ends in a run of bytes with no newline longer than any record.
    Unterminated,
}

fn read_tail(file: &mut File, tail_len: u64) -> io::Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};

    file.seek(SeekFrom::End(-i64::try_from(tail_len).unwrap_or(i64::MAX)))?;
    let mut tail = Vec::with_capacity(usize::try_from(tail_len).unwrap_or(0));
    file.read_to_end(&mut tail)?;
    Ok(tail)
}

/// Streaming iterator over the valid records of a log.
///
/// Holds one line buffer at a time. Lines that fail to decode are skipped
/// and counted. A read error ends iteration early; callers that must not act
/// on a partial scan check [`Records::finish`] or [`Records::take_error`].
#[derive(Debug)]
pub struct Records {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    line: Vec<u8>,
    skipped: usize,
    error: Option<io::Error>,
}

impl Records {
    fn new(path: PathBuf, reader: Option<BufReader<File>>) -> Self {
        Self {
            path,
            reader,
            line: Vec::with_capacity(MAX_LINE_LEN),
            skipped: 0,
            error: None,
        }
    }

    /// Number of non-empty lines skipped as malformed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Takes the read error that ended iteration, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Consumes the iterator, reporting whether the scan hit a read error.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Read`] if iteration stopped on an I/O error.
    pub fn finish(mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(LogError::Read {
                path: self.path,
                source: e,
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let reader = self.reader.as_mut()?;

            let reason = match read_line_bounded(reader, &mut self.line) {
                Ok(Line::End) => {
                    self.reader = None;
                    return None;
                }
                Ok(Line::Complete) => match Record::decode_bytes(&self.line) {
                    Some(record) => return Some(record),
                    None => "malformed",
                },
                // The file ends mid-record: an append that never finished.
                Ok(Line::Unterminated) => "torn",
                Ok(Line::Oversized) => "oversized",
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "log read failed");
                    self.reader = None;
                    self.error = Some(e);
                    return None;
                }
            };

            if reason == "oversized" || !self.line.trim_ascii().is_empty() {
                self.skipped += 1;
                tracing::debug!(
                    path = %self.path.display(),
                    reason,
                    line = %String::from_utf8_lossy(&self.line).trim_end(),
                    "skipping record"
                );
            }
        }
    }
}

/// Result of [`read_line_bounded`].
#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// No more bytes.
    End,
    /// A newline-terminated line is in the buffer.
    Complete,
    /// The file ended before a newline; the fragment is in the buffer.
    Unterminated,
    /// The line was longer than [`MAX_LINE_LEN`]; it was consumed, not kept.
    Oversized,
}

/// Reads one line into `line`, never buffering more than [`MAX_LINE_LEN`]
/// bytes of it.
fn read_line_bounded<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<Line> {
    line.clear();
    let mut oversized = false;

    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if available.is_empty() {
            return Ok(match (oversized, line.is_empty()) {
                (true, _) => Line::Oversized,
                (false, true) => Line::End,
                (false, false) => Line::Unterminated,
            });
        }

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };

        if !oversized {
            if line.len() + used > MAX_LINE_LEN {
                oversized = true;
                line.clear();
            } else {
                line.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if done {
            return Ok(if oversized { Line::Oversized } else { Line::Complete });
        }
    }
}
