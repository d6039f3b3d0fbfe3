// CLI integration tests for the convert/stream/gen flows.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_xylem");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn run_with_stdin(args: &[&str], input: &[u8]) -> std::process::Output {
    let mut child = cmd()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input)
        .expect("write stdin");
    child.wait_with_output().expect("wait")
}

#[test]
fn convert_inline_round_trip() {
    let output = cmd()
        .args(["convert", "<event><id>1</id><v>2</v></event>"])
        .output()
        .expect("convert");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["id"], "1");
    assert_eq!(value["v"], "2");
}

#[test]
fn convert_file_pretty_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("order.xml");
    std::fs::write(
        &path,
        "<order><items><item sku=\"A1\"><name>P</name></item></items></order>",
    )
    .expect("write xml");

    let output = cmd()
        .args(["convert", "-f", path.to_str().unwrap(), "--pretty"])
        .output()
        .expect("convert");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.lines().count() > 1, "pretty output is multi-line");
    let value = parse_json(&text);
    assert_eq!(value["items"]["item"]["@sku"], "A1");
    assert_eq!(value["items"]["item"]["name"], "P");
}

#[test]
fn convert_malformed_reports_parse_error() {
    let output = cmd()
        .args(["convert", "<event><id>test</id><payload>missing</payload"])
        .output()
        .expect("convert");
    assert_eq!(output.status.code().unwrap(), 4);
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let diag = parse_json(stderr.lines().next().expect("stderr json"));
    assert_eq!(diag["error"]["kind"], "Parse");
    assert!(diag["error"]["input"].as_str().unwrap().starts_with("<event>"));
}

#[test]
fn convert_missing_file_not_found_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("missing.xml");
    let output = cmd()
        .args(["convert", "-f", path.to_str().unwrap()])
        .output()
        .expect("convert");
    assert_eq!(output.status.code().unwrap(), 3);
}

#[test]
fn stream_skip_emits_jsonl_and_dead_letters_failures() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dead_letter = temp.path().join("failed.jsonl");

    let input = b"<a><b>1</b></a>\nnot-xml\n<c><d>2</d></c>\n";
    let output = run_with_stdin(
        &[
            "stream",
            "--in",
            "line",
            "--dead-letter",
            dead_letter.to_str().unwrap(),
        ],
        input,
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(parse_json(lines[0])["b"], "1");
    assert_eq!(parse_json(lines[1])["d"], "2");

    let dead = std::fs::read_to_string(&dead_letter).expect("dead-letter file");
    let entry = parse_json(dead.lines().next().expect("dead-letter line"));
    assert_eq!(entry["record"], 2);
    assert_eq!(entry["input"], "not-xml");
    assert!(entry["error"].as_str().is_some());
}

#[test]
fn stream_failure_notices_are_json_on_stderr() {
    let input = b"<a><b>1</b></a>\nnot-xml\n";
    let output = run_with_stdin(&["stream", "--in", "line"], input);
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut saw_failure = false;
    let mut saw_summary = false;
    for line in stderr.lines() {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(notice) = value.get("notice") else {
            continue;
        };
        match notice["kind"].as_str() {
            Some("convert-failure") => {
                saw_failure = true;
                assert_eq!(notice["record"], 2);
                assert_eq!(notice["details"]["error_kind"], "Parse");
            }
            Some("summary") => {
                saw_summary = true;
                assert_eq!(notice["details"]["ok"], 1);
                assert_eq!(notice["details"]["failed"], 1);
            }
            _ => {}
        }
    }
    assert!(saw_failure, "expected a convert-failure notice");
    assert!(saw_summary, "expected a summary notice");
}

#[test]
fn stream_stop_exits_with_parse_code() {
    let input = b"<a><b>1</b></a>\nnot-xml\n<c><d>2</d></c>\n";
    let output = run_with_stdin(&["stream", "--in", "line", "--errors", "stop"], input);
    assert_eq!(output.status.code().unwrap(), 4);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "records before the failure still convert");
}

#[test]
fn gen_output_streams_back_through_convert() {
    let produced = cmd().args(["gen", "-n", "3"]).output().expect("gen");
    assert!(produced.status.success());

    let output = run_with_stdin(&["stream"], &produced.stdout);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let value = parse_json(line);
        assert!(value["id"].as_str().unwrap().starts_with("evt-"));
        assert_eq!(value["source"], "xylem-gen");
        assert!(value["payload"]["value1"].as_str().is_some());
    }
}

#[test]
fn gen_pretty_streams_via_rs_detection() {
    let produced = cmd().args(["gen", "-n", "2", "--pretty"]).output().expect("gen");
    assert!(produced.status.success());

    let output = run_with_stdin(&["stream"], &produced.stdout);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 2);
}

#[test]
fn usage_exit_code() {
    let output = run_with_stdin(&["stream", "--in", "bogus"], b"");
    assert_eq!(output.status.code().unwrap(), 2);
}

#[test]
fn version_emits_json_when_piped() {
    let output = cmd().args(["version"]).output().expect("version");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["name"], "xylem");
    assert!(value["version"].as_str().is_some());
}
