//! Sampling and compaction schedule.
//!
//! [`Scheduler`] holds the only mutable scheduling state of the process:
//! when the last sample and the last compaction happened. Both are measured
//! in monotonic uptime ([`Instant`]), so a wall-clock correction never
//! causes a burst of samples or repeated compactions.
//!
//! The owner drives it by calling [`Scheduler::tick`] from its control loop.
//! A tick that is not due does nothing and returns immediately.

use std::time::Instant;

use crate::clock::Clock;
use crate::compact::{self, CompactionReport};
use crate::config::LogConfig;
use crate::log::AppendLog;
use crate::record::Record;
use crate::sensor::{SampleRejection, Sensor};

/// What happened to the sample slot of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// No sample was due.
    Idle,
    /// A sample was appended to the log.
    Logged(Record),
    /// The sensor returned an implausible reading.
    InvalidSample(SampleRejection),
    /// The wall clock is not synchronized; nothing was logged.
    UnrealClock,
    /// The log is unavailable; the sample was read but not stored.
    LoggingDisabled,
    /// The append failed.
    WriteFailed,
}

/// Result of one [`Scheduler::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// What happened to the sample.
    pub sample: SampleOutcome,
    /// Set if a compaction ran to completion on this tick.
    pub compaction: Option<CompactionReport>,
}

/// Scheduling context for the sampler and the compactor.
#[derive(Debug)]
pub struct Scheduler {
    config: LogConfig,
    last_sample: Instant,
    last_compact: Instant,
}

impl Scheduler {
    /// Creates a scheduler whose timers both start at `now`.
    pub fn new(config: LogConfig, now: Instant) -> Self {
        Self {
            config,
            last_sample: now,
            last_compact: now,
        }
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Runs the boot-time compaction.
    ///
    /// Skipped when the clock is not real. Failures are logged; the original
    /// log is intact in that case.
    pub fn startup<C: Clock + ?Sized>(&self, log: &AppendLog, clock: &C) -> Option<CompactionReport> {
        self.compact(log, clock)
    }

    /// Samples and compacts if due.
    ///
    /// The sample timer advances by exactly one interval per sample so the
    /// cadence does not drift with loop latency. If more than one slot was
    /// missed, the timer restarts from `now` instead. After a sample, the
    /// compaction timer is checked; it is re-armed even when the clock is
    /// not real, so an unsynchronized clock is retried on the next interval
    /// rather than every tick.
    ///
    /// `log` is `None` when storage failed to come up at boot.
    pub fn tick<C, S>(
        &mut self,
        now: Instant,
        log: Option<&AppendLog>,
        clock: &C,
        sensor: &mut S,
    ) -> TickOutcome
    where
        C: Clock + ?Sized,
        S: Sensor + ?Sized,
    {
        let interval = self.config.sample_interval;
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed < interval {
            return TickOutcome {
                sample: SampleOutcome::Idle,
                compaction: None,
            };
        }
        // Missed slots (the loop was blocked for a while) are dropped, not
        // replayed as a burst of back-to-back samples.
        if elapsed >= interval * 2 {
            self.last_sample = now;
        } else {
            self.last_sample += interval;
        }

        let sample = self.take_sample(log, clock, sensor);

        let compaction = match log {
            Some(log)
                if now.saturating_duration_since(self.last_compact)
                    >= self.config.compact_interval =>
            {
                self.last_compact = now;
                self.compact(log, clock)
            }
            _ => None,
        };

        TickOutcome { sample, compaction }
    }

    fn take_sample<C, S>(&self, log: Option<&AppendLog>, clock: &C, sensor: &mut S) -> SampleOutcome
    where
        C: Clock + ?Sized,
        S: Sensor + ?Sized,
    {
        let sample = sensor.sample();
        if let Err(reason) = sample.validate() {
            tracing::warn!(
                temperature_c = sample.temperature_c,
                humidity_pct = sample.humidity_pct,
                %reason,
                "sensor read invalid; skipped"
            );
            return SampleOutcome::InvalidSample(reason);
        }

        let ts = clock.now_utc();
        if !crate::clock::is_real(ts) {
            tracing::warn!(ts, "time not valid; skipped logging");
            return SampleOutcome::UnrealClock;
        }

        let record = Record::new(ts, sample.temperature_c, sample.humidity_pct);
        let Some(log) = log else {
            tracing::debug!(?record, "logging disabled; sample dropped");
            return SampleOutcome::LoggingDisabled;
        };

        match log.append(&record) {
            Ok(()) => {
                tracing::info!(
                    ts,
                    temperature_c = record.temperature_c,
                    humidity_pct = record.humidity_pct,
                    "logged"
                );
                SampleOutcome::Logged(record)
            }
            Err(e) => {
                tracing::error!(error = %e, "append failed");
                SampleOutcome::WriteFailed
            }
        }
    }

    fn compact<C: Clock + ?Sized>(&self, log: &AppendLog, clock: &C) -> Option<CompactionReport> {
        match compact::compact_retention(log, clock.now_utc(), self.config.retention_secs()) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "compaction failed");
                None
            }
        }
    }
}
