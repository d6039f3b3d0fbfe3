//! Purpose: Hold top-level CLI command dispatch for `xylem`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Command behavior, output envelopes, and exit code semantics stay unchanged.
//! Invariants: Helpers in `main.rs` remain the source of shared emission logic.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::Serialize;
use tracing_subscriber::EnvFilter;
use xylem::api::convert;

use super::*;
use super::generate::{GenConfig, generate};
use super::ingest::{ErrorPolicy, IngestConfig, IngestFailure, IngestMode, IngestOutcome, ingest};

const DEFAULT_MAX_RECORD_BYTES: u64 = 8 * 1024 * 1024;
const SNIFF_BYTES: usize = 4096;
const SNIFF_LINES: usize = 8;
const MAX_SNIPPET_BYTES: usize = 256;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "xylem", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Convert { data, file, pretty } => {
            let xml = read_convert_input(data, file)?;
            let value = convert(&xml)?;
            emit_value(&value, pretty)?;
            Ok(RunOutcome::ok())
        }
        Command::Stream {
            file,
            input,
            errors,
            dead_letter,
            max_record_bytes,
        } => {
            init_tracing();
            let max_record_bytes = max_record_bytes
                .as_deref()
                .map(parse_size)
                .transpose()?
                .unwrap_or(DEFAULT_MAX_RECORD_BYTES) as usize;
            let config = IngestConfig {
                mode: ingest_mode(input),
                errors: error_policy(errors),
                sniff_bytes: SNIFF_BYTES,
                sniff_lines: SNIFF_LINES,
                max_record_bytes,
                max_snippet_bytes: MAX_SNIPPET_BYTES,
            };

            let mut dead_letter_writer = dead_letter.as_deref().map(open_dead_letter).transpose()?;
            let mut dead_letter_err: Option<Error> = None;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            let outcome = match file.as_deref() {
                None | Some("-") => {
                    let stdin = io::stdin();
                    run_stream(
                        stdin.lock(),
                        config,
                        &mut out,
                        &mut dead_letter_writer,
                        &mut dead_letter_err,
                        color_mode,
                    )
                }
                Some(path) => {
                    let reader = File::open(path).map_err(|err| open_input_error(err, path))?;
                    run_stream(
                        reader,
                        config,
                        &mut out,
                        &mut dead_letter_writer,
                        &mut dead_letter_err,
                        color_mode,
                    )
                }
            }?;

            if let Some(err) = dead_letter_err {
                return Err(err);
            }

            emit_notice(&summary_notice(&outcome), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Gen { count, delay, pretty } => {
            let delay = delay
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(Duration::ZERO);
            let config = GenConfig { count, delay, pretty };
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            generate(&mut out, &config)?;
            Ok(RunOutcome::ok())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn ingest_mode(input: InputMode) -> IngestMode {
    match input {
        InputMode::Auto => IngestMode::Auto,
        InputMode::Doc => IngestMode::Doc,
        InputMode::Line => IngestMode::Line,
        InputMode::Seq => IngestMode::Seq,
    }
}

fn error_policy(errors: ErrorPolicyCli) -> ErrorPolicy {
    match errors {
        ErrorPolicyCli::Stop => ErrorPolicy::Stop,
        ErrorPolicyCli::Skip => ErrorPolicy::Skip,
    }
}

fn read_convert_input(data: Option<String>, file: Option<String>) -> Result<String, Error> {
    if let Some(data) = data {
        return Ok(data);
    }
    match file.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(buf)
        }
        Some(path) => std::fs::read_to_string(path).map_err(|err| open_input_error(err, path)),
    }
}

fn open_input_error(err: io::Error, path: &str) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        return Error::new(ErrorKind::NotFound)
            .with_message(format!("input file not found: {path}"))
            .with_hint("Check the path, or use - for stdin.");
    }
    Error::new(ErrorKind::Io)
        .with_message(format!("failed to read input file: {path}"))
        .with_source(err)
}

fn emit_value(value: &Value, pretty: bool) -> Result<(), Error> {
    if pretty {
        let text = serde_json::to_string_pretty(value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("json encode failed")
                .with_source(err)
        })?;
        println!("{text}");
    } else {
        println!("{value}");
    }
    Ok(())
}

fn run_stream<R: Read, W: Write>(
    reader: R,
    config: IngestConfig,
    out: &mut W,
    dead_letter: &mut Option<BufWriter<File>>,
    dead_letter_err: &mut Option<Error>,
    color_mode: ColorMode,
) -> Result<IngestOutcome, Error> {
    ingest(
        reader,
        config,
        |value| {
            writeln!(out, "{value}").map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write output")
                    .with_source(err)
            })
        },
        |failure| {
            emit_notice(&failure_notice(&failure), color_mode);
            if let Some(writer) = dead_letter.as_mut() {
                if dead_letter_err.is_none() {
                    if let Err(err) = append_dead_letter(writer, &failure) {
                        *dead_letter_err = Some(err);
                    }
                }
            }
        },
    )
}

fn failure_notice(failure: &IngestFailure) -> Notice {
    let mut details = Map::new();
    details.insert("error_kind".to_string(), json!(failure.error_kind));
    details.insert("mode".to_string(), json!(format!("{:?}", failure.mode)));
    if let Some(line) = failure.line {
        details.insert("line".to_string(), json!(line));
    }
    if let Some(snippet) = &failure.snippet {
        details.insert("snippet".to_string(), json!(snippet));
    }

    Notice {
        kind: "convert-failure".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "stream".to_string(),
        record: Some(failure.index),
        message: failure.message.clone(),
        details,
    }
}

fn summary_notice(outcome: &IngestOutcome) -> Notice {
    let mut details = Map::new();
    details.insert("records_total".to_string(), json!(outcome.records_total));
    details.insert("ok".to_string(), json!(outcome.ok));
    details.insert("failed".to_string(), json!(outcome.failed));

    Notice {
        kind: "summary".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "stream".to_string(),
        record: None,
        message: format!(
            "stream finished: {} ok, {} failed",
            outcome.ok, outcome.failed
        ),
        details,
    }
}

#[derive(Serialize)]
struct DeadLetterRecord<'a> {
    record: u64,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<&'a str>,
}

fn open_dead_letter(path: &Path) -> Result<BufWriter<File>, Error> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to open dead-letter file: {}", path.display()))
                .with_source(err)
        })?;
    Ok(BufWriter::new(file))
}

fn append_dead_letter(writer: &mut BufWriter<File>, failure: &IngestFailure) -> Result<(), Error> {
    let record = DeadLetterRecord {
        record: failure.index,
        error: &failure.message,
        line: failure.line,
        input: failure.input.as_deref(),
    };
    let json = serde_json::to_string(&record).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    writeln!(writer, "{json}").map_err(dead_letter_io_error)?;
    writer.flush().map_err(dead_letter_io_error)
}

fn dead_letter_io_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write dead-letter record")
        .with_source(err)
}
