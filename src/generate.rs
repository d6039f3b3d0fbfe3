//! Purpose: Emit synthetic XML event documents for exercising the stream loop.
//! Exports: `GenConfig`, `generate`.
//! Role: Test-data producer; pairs with `stream` for end-to-end pipelines.
//! Invariants: Every emitted document is well-formed and converts cleanly.
//! Invariants: Pacing sleeps between documents, never after the last one.
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use xylem::api::{Error, ErrorKind};

#[derive(Clone, Debug)]
pub struct GenConfig {
    pub count: u64,
    pub delay: Duration,
    pub pretty: bool,
}

/// Write `config.count` synthetic `<event>` documents to `out`.
///
/// Compact documents are emitted one per line; pretty documents are indented
/// and prefixed with an ASCII record separator so `stream --in auto` can
/// split them.
pub fn generate<W: Write>(out: &mut W, config: &GenConfig) -> Result<u64, Error> {
    for emitted in 0..config.count {
        let doc = event_xml(config.pretty)?;
        if config.pretty {
            out.write_all(b"\x1e").map_err(write_error)?;
        }
        out.write_all(doc.as_bytes()).map_err(write_error)?;
        out.write_all(b"\n").map_err(write_error)?;
        out.flush().map_err(write_error)?;
        if !config.delay.is_zero() && emitted + 1 < config.count {
            thread::sleep(config.delay);
        }
    }
    Ok(config.count)
}

fn event_xml(pretty: bool) -> Result<String, Error> {
    let id = random_token(8)?;
    let marker = random_token(4)?;
    let now_ns = now_ns()?;
    let timestamp = format_ts(now_ns)?;
    let seconds = now_ns as f64 / 1_000_000_000.0;

    if pretty {
        Ok(format!(
            "<event>\n  <id>evt-{id}</id>\n  <source>xylem-gen</source>\n  <timestamp>{timestamp}</timestamp>\n  <payload>\n    <value1>sample data {marker}</value1>\n    <value2>{seconds:.6}</value2>\n  </payload>\n</event>"
        ))
    } else {
        Ok(format!(
            "<event><id>evt-{id}</id><source>xylem-gen</source><timestamp>{timestamp}</timestamp><payload><value1>sample data {marker}</value1><value2>{seconds:.6}</value2></payload></event>"
        ))
    }
}

fn random_token(bytes: usize) -> Result<String, Error> {
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to gather randomness")
            .with_source(err)
    })?;
    let mut token = String::with_capacity(bytes * 2);
    for byte in buf {
        token.push_str(&format!("{byte:02x}"));
    }
    Ok(token)
}

fn now_ns() -> Result<u64, Error> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("time went backwards")
                .with_source(err)
        })?;
    Ok(duration.as_nanos() as u64)
}

fn format_ts(timestamp_ns: u64) -> Result<String, Error> {
    use time::format_description::well_known::Rfc3339;
    let ts =
        time::OffsetDateTime::from_unix_timestamp_nanos(timestamp_ns as i128).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("invalid timestamp")
                .with_source(err)
        })?;
    ts.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("timestamp format failed")
            .with_source(err)
    })
}

fn write_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}
