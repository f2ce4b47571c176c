//! The appliance control loop.
//!
//! One thread does everything: it waits for the clock, opens the log,
//! compacts once, then alternates between serving HTTP connections and
//! ticking the [`Scheduler`]. Nothing runs concurrently with a compaction,
//! so the log has exactly one writer.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use hygrolog::clock::{self, Clock};
use hygrolog::{AppendLog, LogConfig, SampleOutcome, Scheduler, Sensor, TickOutcome};

use crate::api::{self, QueryContext};

/// How often to re-check the clock while waiting for it to become real.
const CLOCK_POLL: Duration = Duration::from_millis(200);

/// Per-connection read timeout.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection write timeout. A client that stops reading a history
/// stream gets dropped instead of stalling sampling.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between polls when no connection is pending.
const IDLE_SLEEP: Duration = Duration::from_millis(20);

/// A running sensor appliance.
pub struct Appliance<C, S> {
    log: Option<AppendLog>,
    scheduler: Scheduler,
    clock: C,
    sensor: S,
}

impl<C: Clock, S: Sensor> Appliance<C, S> {
    /// Brings the appliance up.
    ///
    /// Waits up to `clock_wait` for the clock to become real, opens the log
    /// and runs one compaction. If the log can't be opened the appliance
    /// still comes up, with logging disabled, so the API stays reachable.
    pub fn boot(config: LogConfig, clock: C, sensor: S, clock_wait: Duration) -> Self {
        if clock::wait_for_real_clock(&clock, clock_wait, CLOCK_POLL) {
            tracing::info!(now = clock.now_utc(), "clock synchronized");
        } else {
            tracing::warn!(
                waited = ?clock_wait,
                "clock not synchronized; retention is suspended until it is"
            );
        }

        let log = match AppendLog::open(&config.path) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!(error = %e, "storage unavailable; logging disabled");
                None
            }
        };

        let scheduler = Scheduler::new(config, Instant::now());
        if let Some(log) = &log {
            scheduler.startup(log, &clock);
        }

        Self {
            log,
            scheduler,
            clock,
            sensor,
        }
    }

    /// Whether samples are being persisted.
    pub fn logging_enabled(&self) -> bool {
        self.log.is_some()
    }

    /// Runs one scheduler step.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let outcome = self
            .scheduler
            .tick(now, self.log.as_ref(), &self.clock, &mut self.sensor);
        if let SampleOutcome::Logged(record) = outcome.sample {
            tracing::debug!(ts = record.timestamp, "sample logged");
        }
        outcome
    }

    /// Serves connections on `listener` and runs the schedule, forever.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener itself fails.
    pub fn serve(&mut self, listener: &TcpListener) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "API listening");

        loop {
            self.tick(Instant::now());
            if !self.poll(listener)? {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    /// Accepts and serves at most one pending connection.
    ///
    /// Returns `false` if nothing was waiting. The listener must be in
    /// non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns an error if `accept` fails for a reason other than having
    /// nothing to accept. Errors on an individual connection are logged and
    /// the connection dropped.
    pub fn poll(&mut self, listener: &TcpListener) -> io::Result<bool> {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.serve_connection(&stream, peer) {
            tracing::warn!(%peer, error = %e, "connection error");
        }
        Ok(true)
    }

    fn serve_connection(&self, stream: &TcpStream, peer: SocketAddr) -> io::Result<()> {
        configure_stream(stream)?;
        tracing::trace!(%peer, "connection accepted");

        let ctx = QueryContext {
            log: self.log.as_ref(),
            clock: &self.clock,
            retention_secs: self.scheduler.config().retention_secs(),
        };
        let mut reader = BufReader::new(stream);
        let mut writer = stream;
        api::handle_request(&mut reader, &mut writer, &ctx)
    }
}

/// Switches an accepted connection to blocking I/O with bounded waits.
fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygrolog::clock::ManualClock;
    use hygrolog::Record;
    use std::io::{Read, Write};
    use std::path::Path;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_100_000;

    struct Fixed;

    impl Sensor for Fixed {
        fn read_temperature(&mut self) -> f64 {
            21.5
        }
        fn read_humidity(&mut self) -> f64 {
            55.25
        }
    }

    fn config(path: &Path) -> LogConfig {
        LogConfig {
            path: path.to_path_buf(),
            ..LogConfig::default()
        }
    }

    #[test]
    fn test_boot_compacts_expired_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let log = AppendLog::open(&path).unwrap();
            log.append(&Record::new(NOW - 30 * 86_400, 18.0, 40.0)).unwrap();
            log.append(&Record::new(NOW - 60, 21.0, 50.0)).unwrap();
        }

        let appliance = Appliance::boot(config(&path), ManualClock::new(NOW), Fixed, Duration::ZERO);
        assert!(appliance.logging_enabled());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1700099940,21.00,50.00\n");
    }

    #[test]
    fn test_boot_without_storage_disables_logging() {
        let dir = tempdir().unwrap();
        // A directory where the log file should be makes the open fail.
        let path = dir.path().join("log.csv");
        std::fs::create_dir(&path).unwrap();

        let mut appliance = Appliance::boot(config(&path), ManualClock::new(NOW), Fixed, Duration::ZERO);
        assert!(!appliance.logging_enabled());

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(appliance.tick(later).sample, SampleOutcome::LoggingDisabled);
    }

    #[test]
    fn test_tick_logs_with_wall_clock_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut appliance = Appliance::boot(config(&path), ManualClock::new(NOW), Fixed, Duration::ZERO);

        let later = Instant::now() + Duration::from_secs(60);
        let outcome = appliance.tick(later);
        assert_eq!(outcome.sample, SampleOutcome::Logged(Record::new(NOW, 21.5, 55.25)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1700100000,21.50,55.25\n");
    }

    #[test]
    fn test_poll_serves_one_connection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut appliance = Appliance::boot(config(&path), ManualClock::new(NOW), Fixed, Duration::ZERO);
        appliance.tick(Instant::now() + Duration::from_secs(60));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        assert!(!appliance.poll(&listener).unwrap());

        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"GET /api/latest HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !appliance.poll(&listener).unwrap() {
            assert!(Instant::now() < deadline, "no connection arrived");
            std::thread::sleep(Duration::from_millis(5));
        }

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with(r#"{"ts":1700100000,"tempC":21.5,"humidity":55.25}"#));
    }

    #[test]
    fn test_accepted_streams_have_both_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();

        configure_stream(&stream).unwrap();
        assert_eq!(stream.read_timeout().unwrap(), Some(READ_TIMEOUT));
        assert_eq!(stream.write_timeout().unwrap(), Some(WRITE_TIMEOUT));
    }
}
