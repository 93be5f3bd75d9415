#![cfg(all(unix, feature = "cli"))]

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use serde_json::Value;

const SETTINGS: [&str; 8] = [
    "STDERRPROBE_FORMAT",
    "STDERRPROBE_LOG_FORMAT",
    "STDERRPROBE_LOG_LEVEL",
    "STDERRPROBE_WATCHDOG_MS",
    "STDERRPROBE_MAX_WRITE_COUNT",
    "STDERRPROBE_MAX_BUFFER_SIZE",
    "STDERRPROBE_MAX_READ_COUNT",
    "STDERRPROBE_MAX_COMMAND_LINE",
];

struct Run {
    status: ExitStatus,
    pid: u32,
    stdout: String,
    stderr: Vec<u8>,
    lines: Vec<Value>,
}

impl Run {
    fn reports(&self, role: &str) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| line["tag"] == "RPT" && line["role"] == role)
            .filter_map(|line| line["message"].as_str().map(str::to_string))
            .collect()
    }

    fn has(&self, role: &str, message: &str) -> bool {
        self.reports(role).iter().any(|m| m == message)
    }

    fn find(&self, role: &str, prefix: &str) -> Option<String> {
        self.reports(role).into_iter().find(|m| m.starts_with(prefix))
    }

    fn stream_of(&self, role: &str) -> Option<String> {
        self.lines
            .iter()
            .find(|line| line["role"] == role)
            .and_then(|line| line["stream"].as_str().map(str::to_string))
    }

    fn lock_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("stderrprobe-{}.lock", self.pid))
    }
}

fn run_cli(args: &[&str]) -> Run {
    run_cli_with(args, &[])
}

fn run_cli_with(args: &[&str], env: &[(&str, &str)]) -> Run {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stderrprobe"));
    command.env_remove("STDERRPROBE_SYNC");
    for name in SETTINGS {
        command.env_remove(name);
    }
    command
        .env("STDERRPROBE_FORMAT", "json")
        .env("STDERRPROBE_WATCHDOG_MS", "10000")
        .envs(env.iter().copied())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command.spawn().expect("binary should start");
    let pid = child.id();
    let output = child.wait_with_output().expect("binary should finish");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let lines = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect();

    Run {
        status: output.status,
        pid,
        stdout,
        stderr: output.stderr,
        lines,
    }
}

fn dollars(count: usize) -> String {
    "$".repeat(count)
}

#[test]
fn to_stderr_writes_the_requested_bytes() {
    let run = run_cli(&["to-stderr", "write", "7"]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert_eq!(run.stderr, dollars(7).into_bytes());
    assert!(run.has("PARNT", ":writing-bytes 7"));
    assert!(run.has("PARNT", ":wrote-bytes 7"));
    assert!(run.has("PARNT", ":exiting..."));
    assert_eq!(run.stream_of("PARNT").as_deref(), Some("|"));

    let echo = run
        .lines
        .iter()
        .find(|line| line["tag"] == "CMD")
        .expect("startup line should be present");
    assert_eq!(echo["message"], "to-stderr write 7");
    assert!(!run.lock_path().exists());
}

#[test]
fn write_nl_adds_one_byte() {
    let run = run_cli(&["to-stderr", "write-nl", "3", "lnbuf", "10"]);

    assert_eq!(run.status.code(), Some(0));
    assert_eq!(run.stderr, b"$$$\n".to_vec());
    assert!(run.has("PARNT", ":writing-bytes 4"));
    assert!(run.has("PARNT", ":wrote-bytes 4"));
}

#[test]
fn fully_buffered_bytes_are_flushed_at_exit() {
    let run = run_cli(&["to-stderr", "write", "5", "flbuf", "100"]);

    assert_eq!(run.status.code(), Some(0));
    assert!(run.has("PARNT", ":wrote-bytes 5"));
    assert_eq!(run.stderr, dollars(5).into_bytes());
}

#[test]
fn text_format_uses_tagged_lines() {
    let run = run_cli_with(
        &["to-stderr", "write", "2", "unbuf"],
        &[("STDERRPROBE_FORMAT", "text")],
    );

    assert_eq!(run.status.code(), Some(0));
    assert!(run.stdout.contains("[CMD|:PARNT] to-stderr write 2 unbuf\n"));
    assert!(run.stdout.contains("[RPT|:PARNT] :wrote-bytes 2\n"));
}

#[test]
fn pipe_reads_back_what_was_written() {
    let run = run_cli(&["pipe", "pipe-size", "512", "read", "10", "write", "10"]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert!(run.has(
        "PARNT",
        &format!(":read-bytes 10 :read-chars {}", dollars(10))
    ));
}

#[test]
fn pipe_read_is_short_when_less_was_written() {
    let run = run_cli(&["pipe", "pipe-size", "0", "read", "10", "write", "4"]);

    assert_eq!(run.status.code(), Some(0));
    assert!(run.has("PARNT", ":read-bytes 4 :read-chars $$$$"));
}

#[test]
fn pipe_runs_are_repeatable() {
    let args = ["pipe", "pipe-size", "512", "read", "6", "write", "9"];
    let first = run_cli(&args);
    let second = run_cli(&args);

    assert_eq!(first.status.code(), Some(0));
    assert_eq!(
        first.find("PARNT", ":read-bytes"),
        second.find("PARNT", ":read-bytes")
    );
    assert_eq!(
        first.find("PARNT", ":read-bytes").as_deref(),
        Some(":read-bytes 6 :read-chars $$$$$$")
    );
}

#[test]
fn pipe_handle_reaches_the_child() {
    let run = run_cli(&[
        "pipe-handle-to-child",
        "pipe-size",
        "512",
        "read",
        "10",
        "write",
        "10",
    ]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert!(run.has(
        "PARNT",
        &format!(":read-bytes 10 :read-chars {}", dollars(10))
    ));
    assert!(run.has("PARNT", ":child-exited 0"));
    assert!(run.has("CHILD", ":wrote-bytes 10"));

    let child_echo = run
        .lines
        .iter()
        .find(|line| line["tag"] == "CMD" && line["role"] == "CHILD")
        .and_then(|line| line["message"].as_str().map(str::to_string))
        .expect("child should echo its command");
    assert!(child_echo.starts_with("to-handle "));
    assert!(child_echo.ends_with(" 10"));
}

#[test]
fn to_child_stderr_shares_the_parent_stream() {
    let run = run_cli(&["to-child-stderr", "write", "3"]);

    assert_eq!(run.status.code(), Some(0));
    assert_eq!(run.stderr, dollars(3).into_bytes());
    assert!(run.has("CHILD", ":wrote-bytes 3"));
    assert!(run.has("PARNT", ":child-exited 0"));
}

#[test]
fn pipe_to_child_stderr_reads_the_child_write() {
    let run = run_cli(&[
        "pipe-to-child-stderr",
        "pipe-size",
        "0",
        "read",
        "5",
        "write",
        "5",
    ]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert!(run.has("PARNT", ":read-bytes 5 :read-chars $$$$$"));
    assert!(run.has("PARNT", ":child-exited 0"));
    assert_eq!(run.stream_of("CHILD").as_deref(), Some("|"));
    assert!(run.stderr.is_empty());
}

#[test]
fn line_buffered_child_delivers_the_whole_line() {
    let run = run_cli(&[
        "pipe-to-child-stderr",
        "pipe-size",
        "0",
        "read",
        "16",
        "write-nl",
        "4",
        "lnbuf",
        "16",
    ]);

    assert_eq!(run.status.code(), Some(0));
    assert!(run.has("PARNT", ":read-bytes 5 :read-chars $$$$\n"));
}

#[test]
fn sock_to_child_stderr_reads_over_loopback() {
    let run = run_cli(&["sock-to-child-stderr", "read", "5", "write", "5"]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert!(run
        .find("PARNT", ":socket-provider-IFS-selected ")
        .is_some());
    assert!(run.has("PARNT", ":read-bytes 5 :read-chars $$$$$"));
    assert!(run.has("PARNT", ":child-exited 0"));
    assert_eq!(run.stream_of("CHILD").as_deref(), Some("&"));
}

#[test]
fn invalid_command_lines_exit_with_usage() {
    let cases: [&[&str]; 7] = [
        &[],
        &["unknown"],
        &["to-stderr", "write", "5000"],
        &["to-stderr", "write", "1", "lnbuf", "4096"],
        &["to-stderr", "write", "-1"],
        &["to-stderr", "write", "5", "extra"],
        &["pipe", "pipe-size", "1", "read", "1"],
    ];

    for args in cases {
        let run = run_cli(args);
        assert_eq!(run.status.code(), Some(1), "args: {args:?}");
        assert!(run.lines.is_empty(), "no scenario should start: {args:?}");
        let stderr = String::from_utf8_lossy(&run.stderr);
        assert!(stderr.starts_with("stderrprobe "), "stderr: {stderr}");
        assert!(!run.lock_path().exists());
    }
}

#[test]
fn divergence_names_the_offending_command() {
    let run = run_cli(&["to-stderr", "write", "5000"]);
    let stderr = String::from_utf8_lossy(&run.stderr);

    assert!(stderr.contains("::error::"), "stderr: {stderr}");
    assert!(stderr.contains("to-stderr (write|write-nl) COUNT"));
}

#[test]
fn write_limit_is_configurable_and_inherited() {
    let rejected = run_cli(&["--max-write-count", "10", "to-stderr", "write", "10"]);
    assert_eq!(rejected.status.code(), Some(1));

    let run = run_cli(&[
        "--max-write-count",
        "10000",
        "to-child-stderr",
        "write",
        "6000",
    ]);
    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert_eq!(run.stderr.len(), 6000);
    assert!(run.has("CHILD", ":wrote-bytes 6000"));
}

#[test]
fn oversized_read_request_aborts() {
    let run = run_cli(&[
        "--max-read-count",
        "4",
        "pipe",
        "pipe-size",
        "0",
        "read",
        "5",
        "write",
        "1",
    ]);

    assert_eq!(run.status.code(), None);
    assert_eq!(run.status.signal(), Some(libc::SIGABRT));
    assert!(run.has(
        "PARNT",
        ":FATAL read request of 5 bytes exceeds the limit of 4"
    ));
    assert!(!run.lock_path().exists());
}

#[test]
fn oversized_handle_write_aborts_before_allocating() {
    let run = run_cli(&["to-handle", "2", "9000000000000000000"]);

    assert_eq!(run.status.signal(), Some(libc::SIGABRT));
    assert!(run.has(
        "PARNT",
        ":FATAL write request of 9000000000000000000 bytes is not below the limit of 5000"
    ));
    assert!(run.find("PARNT", ":handle ").is_none());
    assert!(run.stderr.is_empty());
    assert!(!run.lock_path().exists());
}

#[test]
fn handle_write_respects_a_configured_write_limit() {
    let run = run_cli(&["--max-write-count", "4", "to-handle", "2", "4"]);

    assert_eq!(run.status.signal(), Some(libc::SIGABRT));
    assert!(run.has(
        "PARNT",
        ":FATAL write request of 4 bytes is not below the limit of 4"
    ));
    assert!(!run.lock_path().exists());
}

#[test]
fn closed_handle_aborts_with_a_fatal_report() {
    let run = run_cli(&["to-handle", "777", "3"]);

    assert_eq!(run.status.code(), None);
    assert_eq!(run.status.signal(), Some(libc::SIGABRT));
    let fatal = run
        .find("PARNT", ":FATAL transport: handle 777 is not an open descriptor")
        .expect("fatal report");
    assert!(fatal.contains("not an open descriptor"));
    assert!(run.find("PARNT", ":wrote-bytes").is_none());
    assert!(!run.lock_path().exists());
}

#[cfg(target_os = "linux")]
fn small_pages() -> bool {
    // SAFETY: sysconf only queries a system constant.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) == 4096 }
}

#[cfg(target_os = "linux")]
#[test]
fn watchdog_ends_a_blocked_write() {
    if !small_pages() {
        return;
    }
    let run = run_cli(&[
        "--watchdog-ms",
        "300",
        "pipe",
        "pipe-size",
        "4096",
        "read",
        "1",
        "write",
        "4999",
    ]);

    assert_eq!(run.status.code(), Some(99), "stdout: {}", run.stdout);
    assert!(run.has("PARNT", ":killing-after-inactivity-ms 300"));
    assert!(run.find("PARNT", ":read-bytes").is_none());
    assert!(!run.lock_path().exists());
}

#[cfg(target_os = "linux")]
#[test]
fn parent_reports_a_child_ended_by_its_watchdog() {
    if !small_pages() {
        return;
    }
    let run = run_cli(&[
        "--watchdog-ms",
        "1000",
        "pipe-to-child-stderr",
        "pipe-size",
        "4096",
        "read",
        "1",
        "write",
        "4999",
    ]);

    assert_eq!(run.status.code(), Some(0), "stdout: {}", run.stdout);
    assert!(run.has("CHILD", ":killing-after-inactivity-ms 500"));
    assert!(run.has("PARNT", ":read-bytes 1 :read-chars $"));
    assert!(run.has("PARNT", ":child-exited 99"));
}
