//! Purpose: Split input streams into XML records and convert each to JSON.
//! Exports: `IngestMode`, `ErrorPolicy`, `IngestConfig`, `IngestOutcome`, `IngestFailure`, `ingest`.
//! Role: Host-side stream loop used by the CLI; the converter itself stays pure.
//! Invariants: Auto detection is deterministic, bounded, and documented by config limits.
//! Invariants: Skip mode only continues at well-defined record boundaries.
//! Invariants: No unbounded buffering; per-record buffering is capped.
use std::error::Error as StdError;
use std::io::{self, BufRead, BufReader, Read};

use bstr::ByteSlice;
use serde_json::Value;
use xylem::api::{Error, ErrorKind, convert};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IngestMode {
    Auto,
    Doc,
    Line,
    Seq,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorPolicy {
    Stop,
    Skip,
}

#[derive(Copy, Clone, Debug)]
pub struct IngestConfig {
    pub mode: IngestMode,
    pub errors: ErrorPolicy,
    pub sniff_bytes: usize,
    pub sniff_lines: usize,
    pub max_record_bytes: usize,
    pub max_snippet_bytes: usize,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct IngestOutcome {
    pub records_total: u64,
    pub ok: u64,
    pub failed: u64,
}

#[derive(Clone, Debug)]
pub struct IngestFailure {
    pub index: u64,
    pub mode: IngestMode,
    pub message: String,
    pub error_kind: String,
    pub snippet: Option<String>,
    pub line: Option<u64>,
    /// Full record text when it was held in memory, for dead-lettering.
    pub input: Option<String>,
}

fn io_error(err: io::Error, message: &str) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_source(err)
}

pub fn ingest<R, F, N>(
    reader: R,
    config: IngestConfig,
    mut on_value: F,
    mut on_failure: N,
) -> Result<IngestOutcome, Error>
where
    R: Read,
    F: FnMut(Value) -> Result<(), Error>,
    N: FnMut(IngestFailure),
{
    let mut outcome = IngestOutcome::default();
    let mut ok = 0u64;
    let mut failed = 0u64;

    let mut handle_failure = |index: u64,
                              mode: IngestMode,
                              line: Option<u64>,
                              message: &str,
                              error_kind: &str,
                              snippet: Option<String>,
                              input: Option<String>|
     -> Result<(), Error> {
        match config.errors {
            ErrorPolicy::Stop => {
                let mut err = if error_kind == "Parse" {
                    Error::new(ErrorKind::Parse)
                        .with_message(message)
                        .with_hint("Use -e skip to continue past bad documents.")
                } else {
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint("Raise --max-record-bytes or use -e skip.")
                };
                if let Some(input) = input {
                    err = err.with_input(input);
                }
                Err(err)
            }
            ErrorPolicy::Skip => {
                failed += 1;
                on_failure(IngestFailure {
                    index,
                    mode,
                    message: message.to_string(),
                    error_kind: error_kind.to_string(),
                    snippet,
                    line,
                    input,
                });
                Ok(())
            }
        }
    };

    let mut accept_value = |value: Value, _index: u64| -> Result<(), Error> {
        on_value(value)?;
        ok += 1;
        Ok(())
    };

    match config.mode {
        IngestMode::Auto => {
            let (auto_mode, reader) = sniff_auto(reader, &config)?;
            match auto_mode {
                AutoMode::Seq => {
                    ingest_seq(reader, config, &mut accept_value, &mut handle_failure)
                }
                AutoMode::Line => {
                    ingest_line(reader, config, &mut accept_value, &mut handle_failure)
                }
                AutoMode::Doc => {
                    ingest_doc(reader, config, &mut accept_value, &mut handle_failure)
                }
            }
        }
        IngestMode::Doc => ingest_doc(reader, config, &mut accept_value, &mut handle_failure),
        IngestMode::Line => ingest_line(reader, config, &mut accept_value, &mut handle_failure),
        IngestMode::Seq => ingest_seq(reader, config, &mut accept_value, &mut handle_failure),
    }?;

    outcome.ok = ok;
    outcome.failed = failed;
    outcome.records_total = ok + failed;

    Ok(outcome)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AutoMode {
    Doc,
    Line,
    Seq,
}

fn sniff_auto<R: Read>(
    reader: R,
    config: &IngestConfig,
) -> Result<(AutoMode, PrefixReader<R>), Error> {
    let mut buf_reader = BufReader::new(reader);
    let mut prefix = Vec::new();
    let mut lines = 0usize;
    while prefix.len() < config.sniff_bytes && lines < config.sniff_lines {
        let available = buf_reader
            .fill_buf()
            .map_err(|err| io_error(err, "failed to read input"))?;
        if available.is_empty() {
            break;
        }
        let take = available
            .len()
            .min(config.sniff_bytes.saturating_sub(prefix.len()));
        let newline_count = available[..take].iter().filter(|b| **b == b'\n').count();
        prefix.extend_from_slice(&available[..take]);
        buf_reader.consume(take);
        lines += newline_count;
    }

    let auto_mode = detect_auto_mode(&prefix);
    Ok((auto_mode, PrefixReader::new(prefix, buf_reader)))
}

fn detect_auto_mode(prefix: &[u8]) -> AutoMode {
    if prefix.contains(&0x1e) {
        return AutoMode::Seq;
    }
    let text = prefix.to_str_lossy();
    // The sniffed prefix may end mid-line; only complete lines are judged.
    let pieces: Vec<&str> = text.split('\n').collect();
    let complete = pieces.len().saturating_sub(1);
    let mut doc_lines = 0usize;
    for piece in pieces.iter().take(complete) {
        let line = piece.trim();
        if line.is_empty() {
            continue;
        }
        if looks_like_whole_document(line) {
            doc_lines += 1;
        } else {
            return AutoMode::Doc;
        }
    }
    if doc_lines >= 2 {
        AutoMode::Line
    } else {
        AutoMode::Doc
    }
}

/// True when a single line could be a self-contained document. An opening
/// fragment like `<event>` fails this, so pretty-printed documents fall back
/// to doc mode.
fn looks_like_whole_document(line: &str) -> bool {
    line.starts_with('<')
        && line.ends_with('>')
        && (line.ends_with("/>") || line.contains("</"))
}

fn convert_record<F, N>(
    record: &str,
    index: u64,
    mode: IngestMode,
    line: Option<u64>,
    config: IngestConfig,
    on_value: &mut F,
    on_failure: &mut N,
) -> Result<(), Error>
where
    F: FnMut(Value, u64) -> Result<(), Error>,
    N: FnMut(u64, IngestMode, Option<u64>, &str, &str, Option<String>, Option<String>) -> Result<(), Error>,
{
    let snippet = truncate_snippet(record, config.max_snippet_bytes);
    tracing::debug!(record = index, snippet = %snippet, "received xml document");
    match convert(record) {
        Ok(value) => on_value(value, index),
        Err(err) => {
            tracing::warn!(record = index, error = %err, "xml conversion failed");
            let base = err.message().unwrap_or("invalid xml document");
            let message = match err.source() {
                Some(cause) => format!("{base}: {cause}"),
                None => base.to_string(),
            };
            on_failure(
                index,
                mode,
                line,
                &message,
                "Parse",
                Some(snippet),
                Some(record.to_string()),
            )
        }
    }
}

fn ingest_doc<R, F, N>(
    mut reader: R,
    config: IngestConfig,
    on_value: &mut F,
    on_failure: &mut N,
) -> Result<(), Error>
where
    R: Read,
    F: FnMut(Value, u64) -> Result<(), Error>,
    N: FnMut(u64, IngestMode, Option<u64>, &str, &str, Option<String>, Option<String>) -> Result<(), Error>,
{
    let mut buf = String::new();
    reader
        .read_to_string(&mut buf)
        .map_err(|err| io_error(err, "failed to read input"))?;
    if buf.trim().is_empty() {
        return Ok(());
    }
    if buf.len() > config.max_record_bytes {
        on_failure(
            1,
            IngestMode::Doc,
            None,
            "record exceeds size limit",
            "Oversize",
            Some(truncate_snippet(&buf, config.max_snippet_bytes)),
            None,
        )?;
        return Ok(());
    }
    convert_record(&buf, 1, IngestMode::Doc, None, config, on_value, on_failure)
}

fn ingest_line<R, F, N>(
    reader: R,
    config: IngestConfig,
    on_value: &mut F,
    on_failure: &mut N,
) -> Result<(), Error>
where
    R: Read,
    F: FnMut(Value, u64) -> Result<(), Error>,
    N: FnMut(u64, IngestMode, Option<u64>, &str, &str, Option<String>, Option<String>) -> Result<(), Error>,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut index = 0u64;
    let mut line_no = 0u64;
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|err| io_error(err, "failed to read input"))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.trim().is_empty() {
            continue;
        }
        index += 1;
        if trimmed.len() > config.max_record_bytes {
            on_failure(
                index,
                IngestMode::Line,
                Some(line_no),
                "record exceeds size limit",
                "Oversize",
                Some(truncate_snippet(trimmed, config.max_snippet_bytes)),
                None,
            )?;
            continue;
        }
        convert_record(
            trimmed,
            index,
            IngestMode::Line,
            Some(line_no),
            config,
            on_value,
            on_failure,
        )?;
    }
    Ok(())
}

fn ingest_seq<R, F, N>(
    reader: R,
    config: IngestConfig,
    on_value: &mut F,
    on_failure: &mut N,
) -> Result<(), Error>
where
    R: Read,
    F: FnMut(Value, u64) -> Result<(), Error>,
    N: FnMut(u64, IngestMode, Option<u64>, &str, &str, Option<String>, Option<String>) -> Result<(), Error>,
{
    fn handle_record<F, N>(
        record: &[u8],
        index: u64,
        config: IngestConfig,
        on_value: &mut F,
        on_failure: &mut N,
    ) -> Result<(), Error>
    where
        F: FnMut(Value, u64) -> Result<(), Error>,
        N: FnMut(u64, IngestMode, Option<u64>, &str, &str, Option<String>, Option<String>) -> Result<(), Error>,
    {
        if record.len() > config.max_record_bytes {
            return on_failure(
                index,
                IngestMode::Seq,
                None,
                "record exceeds size limit",
                "Oversize",
                Some(truncate_bytes(record, config.max_snippet_bytes)),
                None,
            );
        }
        let text = record.to_str_lossy();
        convert_record(&text, index, IngestMode::Seq, None, config, on_value, on_failure)
    }

    let mut index = 0u64;
    let mut buf_reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let mut skipping = false;
    loop {
        let read = buf_reader
            .read(&mut tmp)
            .map_err(|err| io_error(err, "failed to read input"))?;
        if read == 0 {
            break;
        }
        let mut slice = &tmp[..read];
        while !slice.is_empty() {
            if skipping {
                if let Some(pos) = slice.iter().position(|b| *b == 0x1e) {
                    slice = &slice[pos + 1..];
                    skipping = false;
                } else {
                    slice = &[];
                }
                continue;
            }

            if let Some(pos) = slice.iter().position(|b| *b == 0x1e) {
                buf.extend_from_slice(&slice[..pos]);
                let record = std::mem::take(&mut buf);
                if !record.iter().all(|b| b.is_ascii_whitespace()) {
                    index += 1;
                    handle_record(&record, index, config, on_value, on_failure)?;
                }
                slice = &slice[pos + 1..];
                continue;
            }

            buf.extend_from_slice(slice);
            slice = &[];
            if buf.len() > config.max_record_bytes {
                index += 1;
                on_failure(
                    index,
                    IngestMode::Seq,
                    None,
                    "record exceeds size limit",
                    "Oversize",
                    Some(truncate_bytes(&buf, config.max_snippet_bytes)),
                    None,
                )?;
                buf.clear();
                skipping = true;
            }
        }
    }
    if !skipping && !buf.is_empty() && !buf.iter().all(|b| b.is_ascii_whitespace()) {
        index += 1;
        handle_record(&buf, index, config, on_value, on_failure)?;
    }
    Ok(())
}

pub(crate) fn truncate_snippet(input: &str, max: usize) -> String {
    let mut snippet = String::new();
    if input.len() <= max {
        snippet.push_str(input);
        return snippet;
    }
    let suffix = "...";
    if max <= suffix.len() {
        snippet.push_str(&suffix[..max]);
        return snippet;
    }
    let take = max - suffix.len();
    let mut end = take;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    snippet.push_str(&input[..end]);
    snippet.push_str(suffix);
    snippet
}

fn truncate_bytes(input: &[u8], max: usize) -> String {
    let text = input.to_str_lossy();
    truncate_snippet(&text, max)
}

struct PrefixReader<R: Read> {
    prefix: io::Cursor<Vec<u8>>,
    inner: BufReader<R>,
}

impl<R: Read> PrefixReader<R> {
    fn new(prefix: Vec<u8>, inner: BufReader<R>) -> Self {
        Self {
            prefix: io::Cursor::new(prefix),
            inner,
        }
    }
}

impl<R: Read> Read for PrefixReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.prefix.read(buf)?;
        if read > 0 {
            return Ok(read);
        }
        self.inner.read(buf)
    }
}
