//! JSON representation of query results.
//!
//! Readings are rendered as `{"ts":1700000100,"tempC":21.5,"humidity":55.25}`.
//! History is written as a JSON array one object at a time by
//! [`write_json_array`], so a response never holds more than one record.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Error body when the log holds no valid record.
pub const NO_DATA: &str = r#"{"error":"no_data"}"#;

/// Error body when the latest record cannot be rendered.
pub const BAD_LOG_FORMAT: &str = r#"{"error":"bad_log_format"}"#;

/// Error body when the log cannot be read at all.
pub const STORAGE_UNAVAILABLE: &str = r#"{"error":"storage_unavailable"}"#;

/// Error body for unknown routes.
pub const NOT_FOUND: &str = r#"{"error":"not_found"}"#;

/// Wire form of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Seconds since epoch.
    pub ts: i64,
    /// Temperature in degrees Celsius.
    #[serde(rename = "tempC")]
    pub temp_c: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

impl From<Record> for Reading {
    fn from(record: Record) -> Self {
        Self {
            ts: record.timestamp,
            temp_c: record.temperature_c,
            humidity: record.humidity_pct,
        }
    }
}

/// Outcome of a latest-reading request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatestResponse {
    /// The most recent valid reading.
    Found(Reading),
    /// The log has no valid record yet.
    NoData,
    /// A record was found but cannot be represented.
    BadFormat,
}

impl LatestResponse {
    /// Builds the response for the result of [`crate::query::latest`].
    ///
    /// A record with non-finite values can't be expressed in JSON; the
    /// decoder already rejects those, this is a second check on the way out.
    pub fn from_latest(latest: Option<Record>) -> Self {
        match latest {
            None => Self::NoData,
            Some(record) if !record.is_finite() => Self::BadFormat,
            Some(record) => Self::Found(record.into()),
        }
    }

    /// HTTP status code for this outcome.
    pub fn status(&self) -> u16 {
        match self {
            Self::Found(_) => 200,
            Self::NoData => 404,
            Self::BadFormat => 500,
        }
    }

    /// JSON body for this outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn body(&self) -> serde_json::Result<String> {
        match self {
            Self::Found(reading) => serde_json::to_string(reading),
            Self::NoData => Ok(NO_DATA.to_string()),
            Self::BadFormat => Ok(BAD_LOG_FORMAT.to_string()),
        }
    }
}

/// Writes `records` to `out` as a JSON array, one element at a time.
///
/// Returns the number of elements written. An empty iterator produces `[]`.
///
/// # Errors
///
/// Returns the first write or serialization error; the output is then
/// incomplete.
pub fn write_json_array<I, W>(records: I, mut out: W) -> io::Result<usize>
where
    I: IntoIterator<Item = Record>,
    W: Write,
{
    out.write_all(b"[")?;
    let mut count = 0;
    for record in records {
        if count > 0 {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut out, &Reading::from(record))?;
        count += 1;
    }
    out.write_all(b"]")?;
    out.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_field_names() {
        let reading = Reading::from(Record::new(1_700_000_100, 21.5, 55.25));
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(json, r#"{"ts":1700000100,"tempC":21.5,"humidity":55.25}"#);
    }

    #[test]
    fn test_latest_outcomes() {
        assert_eq!(LatestResponse::from_latest(None), LatestResponse::NoData);
        assert_eq!(LatestResponse::NoData.status(), 404);
        assert_eq!(LatestResponse::NoData.body().unwrap(), NO_DATA);

        let bad = LatestResponse::from_latest(Some(Record::new(1_700_000_100, f64::NAN, 50.0)));
        assert_eq!(bad, LatestResponse::BadFormat);
        assert_eq!(bad.status(), 500);
        assert_eq!(bad.body().unwrap(), BAD_LOG_FORMAT);

        let found = LatestResponse::from_latest(Some(Record::new(1_700_000_100, 21.5, 55.25)));
        assert_eq!(found.status(), 200);
        let parsed: Reading = serde_json::from_str(&found.body().unwrap()).unwrap();
        assert_eq!(parsed.ts, 1_700_000_100);
        assert_eq!(parsed.temp_c, 21.5);
        assert_eq!(parsed.humidity, 55.25);
    }

    #[test]
    fn test_write_json_array_empty() {
        let mut out = Vec::new();
        let n = write_json_array(std::iter::empty(), &mut out).unwrap();
        assert_eq!(n, 0);
        assert_eq!(out, b"[]");
    }

    #[test]
    fn test_write_json_array_is_valid_json() {
        let records = vec![
            Record::new(1_700_000_100, 21.5, 55.25),
            Record::new(1_700_003_700, 22.0, 50.0),
        ];
        let mut out = Vec::new();
        let n = write_json_array(records, &mut out).unwrap();
        assert_eq!(n, 2);

        let parsed: Vec<Reading> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].ts, 1_700_000_100);
        assert_eq!(parsed[1].humidity, 50.0);
    }
}
