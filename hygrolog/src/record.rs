//! Record codec: one sensor observation per text line.
//!
//! # Line Format
//!
//! ```text
//! 1700000100,21.50,55.25\n
//! ^ts        ^tempC ^humidity
//! ```
//!
//! Three comma-separated fields, floats rendered with exactly two decimals,
//! newline-terminated, no header. Decoding is tolerant: anything that does
//! not look like a complete record returns `None` and callers skip it.

/// Field delimiter within a line.
pub const DELIMITER: char = ',';

/// Lines shorter than this (after trimming) can't be a record.
pub const MIN_LINE_LEN: usize = 5;

/// Upper bound on an encoded line, newline included.
pub const MAX_LINE_LEN: usize = 64;

/// A single timestamped temperature/humidity observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Seconds since the Unix epoch, UTC.
    pub timestamp: i64,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity in percent.
    pub humidity_pct: f64,
}

impl Record {
    /// Creates a new record.
    pub fn new(timestamp: i64, temperature_c: f64, humidity_pct: f64) -> Self {
        Self {
            timestamp,
            temperature_c,
            humidity_pct,
        }
    }

    /// Encodes the record as a newline-terminated line.
    ///
    /// # Examples
    ///
    /// ```
    /// use hygrolog::Record;
    ///
    /// let line = Record::new(1_700_000_100, 21.5, 55.25).encode();
    /// assert_eq!(line, "1700000100,21.50,55.25\n");
    /// ```
    pub fn encode(&self) -> String {
        format!(
            "{}{DELIMITER}{:.2}{DELIMITER}{:.2}\n",
            self.timestamp, self.temperature_c, self.humidity_pct
        )
    }

    /// Decodes a line produced by [`Record::encode`].
    ///
    /// Surrounding whitespace (including the line terminator) is ignored.
    /// Returns `None` for short lines, a wrong field count, unparsable
    /// fields, or non-finite values.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.len() < MIN_LINE_LEN {
            return None;
        }

        let mut fields = line.split(DELIMITER);
        let ts = fields.next()?;
        let temp = fields.next()?;
        let hum = fields.next()?;
        if fields.next().is_some() {
            return None;
        }

        let timestamp = ts.trim().parse::<i64>().ok()?;
        let temperature_c = parse_finite(temp)?;
        let humidity_pct = parse_finite(hum)?;

        Some(Self::new(timestamp, temperature_c, humidity_pct))
    }

    /// Decodes raw bytes read from storage; invalid UTF-8 is malformed.
    pub fn decode_bytes(line: &[u8]) -> Option<Self> {
        std::str::from_utf8(line).ok().and_then(Self::decode)
    }

    /// Returns `true` if both measurements are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.temperature_c.is_finite() && self.humidity_pct.is_finite()
    }
}

fn parse_finite(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
