//! Minimal HTTP API over the sensor log.
//!
//! Uses `std::net` directly: requests are served one at a time, to
//! completion, by the control loop in [`crate::appliance`].
//! Endpoints:
//!
//! - `GET /api/latest`  — most recent reading, or 404 `no_data`
//! - `GET /api/history?since=<epoch>|days=<n>` — readings as a JSON array
//! - `GET /api/health`  — liveness check
//!
//! History is sent with chunked transfer encoding and produced one record
//! at a time, so the response size is not limited by memory.

use std::io::{self, BufRead, BufWriter, Write};

use hygrolog::clock::Clock;
use hygrolog::log::AppendLog;
use hygrolog::query::{self, HistoryParams};
use hygrolog::response::{self, LatestResponse};

/// Bytes buffered per chunk of a streamed response.
const CHUNK_SIZE: usize = 1024;

/// Everything a request handler can see.
pub struct QueryContext<'a> {
    /// The log, or `None` if storage failed at boot.
    pub log: Option<&'a AppendLog>,
    /// Wall clock used to resolve `days` windows.
    pub clock: &'a dyn Clock,
    /// Retention horizon in seconds; the default history window.
    pub retention_secs: i64,
}

/// Reads one request from `reader` and writes the response to `writer`.
///
/// # Errors
///
/// Returns an error if the request can't be read or the response can't be
/// written. The connection should be dropped in that case.
pub fn handle_request<R, W>(reader: &mut R, writer: &mut W, ctx: &QueryContext<'_>) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Parse: "GET /path?query HTTP/1.x"
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return send_json(writer, 400, r#"{"error":"bad_request"}"#);
    }
    let (method, target) = (parts[0], parts[1]);

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    // Drain remaining headers (we don't need them)
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
    }

    if method != "GET" {
        return send_json(writer, 405, r#"{"error":"method_not_allowed"}"#);
    }

    tracing::debug!(path, query, "request");

    match path {
        "/api/latest" => handle_latest(writer, ctx),
        "/api/history" => handle_history(writer, ctx, query),
        "/api/health" => {
            let body = serde_json::json!({
                "status": "ok",
                "logging": ctx.log.is_some(),
                "clock_synced": ctx.clock.is_real(),
            });
            send_json(writer, 200, &body.to_string())
        }
        _ => send_json(writer, 404, response::NOT_FOUND),
    }
}

/// `GET /api/latest`: returns the most recent valid reading.
fn handle_latest<W: Write>(writer: &mut W, ctx: &QueryContext<'_>) -> io::Result<()> {
    let latest = match ctx.log.map(query::latest).transpose() {
        Ok(latest) => latest.flatten(),
        Err(e) => {
            tracing::warn!(error = %e, "latest query failed");
            return send_json(writer, 500, response::STORAGE_UNAVAILABLE);
        }
    };

    let outcome = LatestResponse::from_latest(latest);
    send_json(writer, outcome.status(), &outcome.body()?)
}

/// `GET /api/history?since=<epoch>|days=<n>`: streams matching readings.
fn handle_history<W: Write>(writer: &mut W, ctx: &QueryContext<'_>, query_string: &str) -> io::Result<()> {
    let params = HistoryParams::from_query(query_string);
    let threshold = query::resolve_threshold(&params, ctx.clock.now_utc(), ctx.retention_secs);

    let Some(log) = ctx.log else {
        return send_json(writer, 200, "[]");
    };

    let mut since = match query::since(log, threshold) {
        Ok(since) => since,
        Err(e) => {
            tracing::warn!(error = %e, "history query failed");
            return send_json(writer, 500, response::STORAGE_UNAVAILABLE);
        }
    };

    write_head(writer, 200, &["Transfer-Encoding: chunked"])?;
    let mut body = BufWriter::with_capacity(CHUNK_SIZE, ChunkedWriter::new(&mut *writer));
    let count = response::write_json_array(since.by_ref(), &mut body)?;
    body.into_inner().map_err(|e| e.into_error())?.finish()?;

    if let Err(e) = since.finish() {
        // Headers are already out; the client gets a shorter array.
        tracing::warn!(error = %e, "history truncated by read error");
    }
    tracing::debug!(threshold, count, "history served");
    Ok(())
}

/// Writes the status line and headers, ending with the blank line.
fn write_head<W: Write>(writer: &mut W, status: u16, extra_headers: &[&str]) -> io::Result<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    write!(writer, "HTTP/1.1 {status} {status_text}\r\nContent-Type: application/json\r\n")?;
    for header in extra_headers {
        write!(writer, "{header}\r\n")?;
    }
    writer.write_all(b"Connection: close\r\n\r\n")
}

/// Sends a complete JSON response with a known length.
fn send_json<W: Write>(writer: &mut W, status: u16, body: &str) -> io::Result<()> {
    let length = format!("Content-Length: {}", body.len());
    write_head(writer, status, &[&length])?;
    writer.write_all(body.as_bytes())?;
    writer.flush()
}

/// Frames every `write` as one HTTP/1.1 chunk.
///
/// Wrap it in a [`BufWriter`] to control the chunk size, and call
/// [`ChunkedWriter::finish`] to send the terminating chunk.
struct ChunkedWriter<W: Write> {
    inner: W,
}

impl<W: Write> ChunkedWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }

    fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"0\r\n\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        write!(self.inner, "{:X}\r\n", buf.len())?;
        self.inner.write_all(buf)?;
        self.inner.write_all(b"\r\n")?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
