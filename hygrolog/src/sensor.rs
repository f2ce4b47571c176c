//! Sensor interface and sample validation.
//!
//! The storage layer never talks to hardware. A [`Sensor`] produces raw
//! readings (NaN when a read fails), and [`Sample::validate`] decides
//! whether they are physically plausible before anything reaches the log.

use std::fmt;

/// Lowest temperature the sensor can report, in °C.
pub const TEMPERATURE_MIN_C: f64 = -40.0;

/// Highest temperature the sensor can report, in °C.
pub const TEMPERATURE_MAX_C: f64 = 125.0;

/// Humidity bounds, in percent.
pub const HUMIDITY_RANGE_PCT: (f64, f64) = (0.0, 100.0);

/// A temperature/humidity sensor.
pub trait Sensor {
    /// Reads the temperature in °C, or NaN on failure.
    fn read_temperature(&mut self) -> f64;

    /// Reads relative humidity in percent, or NaN on failure.
    fn read_humidity(&mut self) -> f64;

    /// Reads both values.
    fn sample(&mut self) -> Sample {
        let temperature_c = self.read_temperature();
        let humidity_pct = self.read_humidity();
        Sample {
            temperature_c,
            humidity_pct,
        }
    }
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn read_temperature(&mut self) -> f64 {
        (**self).read_temperature()
    }

    fn read_humidity(&mut self) -> f64 {
        (**self).read_humidity()
    }
}

/// One raw pair of readings, not yet validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Temperature in °C.
    pub temperature_c: f64,
    /// Relative humidity in percent.
    pub humidity_pct: f64,
}

/// Why a sample was not logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRejection {
    /// Temperature was NaN or infinite.
    TemperatureNotANumber,
    /// Temperature was outside the sensor's range.
    TemperatureOutOfRange,
    /// Humidity was NaN or infinite.
    HumidityNotANumber,
    /// Humidity was outside 0-100 %.
    HumidityOutOfRange,
}

impl fmt::Display for SampleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::TemperatureNotANumber => "temperature is not a number",
            Self::TemperatureOutOfRange => "temperature out of range",
            Self::HumidityNotANumber => "humidity is not a number",
            Self::HumidityOutOfRange => "humidity out of range",
        };
        f.write_str(reason)
    }
}

impl Sample {
    /// Checks the sample against the sensor's physical range.
    ///
    /// # Errors
    ///
    /// Returns the first [`SampleRejection`] that applies.
    pub fn validate(&self) -> Result<(), SampleRejection> {
        if !self.temperature_c.is_finite() {
            return Err(SampleRejection::TemperatureNotANumber);
        }
        if !(TEMPERATURE_MIN_C..=TEMPERATURE_MAX_C).contains(&self.temperature_c) {
            return Err(SampleRejection::TemperatureOutOfRange);
        }
        if !self.humidity_pct.is_finite() {
            return Err(SampleRejection::HumidityNotANumber);
        }
        let (lo, hi) = HUMIDITY_RANGE_PCT;
        if !(lo..=hi).contains(&self.humidity_pct) {
            return Err(SampleRejection::HumidityOutOfRange);
        }
        Ok(())
    }
}
