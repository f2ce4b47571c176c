//! Sensor backends available to the daemon.

use std::f64::consts::TAU;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use hygrolog::sensor::Sensor;

/// Samples per simulated day at the default one-minute cadence.
const SIMULATED_DAY_STEPS: f64 = 1440.0;

/// Deterministic diurnal curve, for running without hardware.
///
/// Temperature swings ±4 °C around 21 °C and humidity moves opposite to it,
/// one full cycle every 1440 samples.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    step: u64,
}

impl SimulatedSensor {
    fn phase(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let step = (self.step % 1440) as f64;
        (step / SIMULATED_DAY_STEPS * TAU).sin()
    }
}

impl Sensor for SimulatedSensor {
    fn read_temperature(&mut self) -> f64 {
        21.0 + 4.0 * self.phase()
    }

    fn read_humidity(&mut self) -> f64 {
        let humidity = 55.0 - 10.0 * self.phase();
        self.step = self.step.wrapping_add(1);
        humidity
    }
}

/// Reads `<tempC> <humidity>` from a file on every sample.
///
/// Useful with a sysfs attribute or a file kept current by another
/// process. Values may be separated by whitespace or a comma. Any read or
/// parse failure yields NaN, which the sampler rejects.
#[derive(Debug)]
pub struct FileSensor {
    path: PathBuf,
    pending_humidity: f64,
}

impl FileSensor {
    /// Creates a sensor backed by `path`. The file need not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending_humidity: f64::NAN,
        }
    }

    fn read_pair(&self) -> Option<(f64, f64)> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "sensor file unreadable");
                return None;
            }
        };
        let mut fields = contents
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty());
        let temperature = fields.next()?.parse().ok()?;
        let humidity = fields.next()?.parse().ok()?;
        Some((temperature, humidity))
    }
}

impl Sensor for FileSensor {
    fn read_temperature(&mut self) -> f64 {
        // Both values come from one read so they describe the same moment.
        let (temperature, humidity) = self.read_pair().unwrap_or((f64::NAN, f64::NAN));
        self.pending_humidity = humidity;
        temperature
    }

    fn read_humidity(&mut self) -> f64 {
        std::mem::replace(&mut self.pending_humidity, f64::NAN)
    }
}

/// `--sensor` argument: `simulated` or `file:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorSpec {
    /// [`SimulatedSensor`].
    Simulated,
    /// [`FileSensor`] reading the given path.
    File(PathBuf),
}

impl SensorSpec {
    /// Instantiates the sensor.
    pub fn build(&self) -> Box<dyn Sensor> {
        match self {
            Self::Simulated => Box::new(SimulatedSensor::default()),
            Self::File(path) => Box::new(FileSensor::new(path.clone())),
        }
    }
}

impl FromStr for SensorSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "simulated" => Ok(Self::Simulated),
            Some(("file", path)) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            _ => Err(format!("unknown sensor '{s}'; use 'simulated' or 'file:<path>'")),
        }
    }
}

impl fmt::Display for SensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulated => f.write_str("simulated"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}
