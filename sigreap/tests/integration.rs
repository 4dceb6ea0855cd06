//! End-to-end tests against the built `sigreap` binary.
//!
//! Each test launches its own supervisor, so subreaper and signal state never
//! leak into the test harness process.

use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

const TIMEOUT: Duration = Duration::from_secs(20);

fn sigreap(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sigreap"));
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Wait for the supervisor on a helper thread so a hang fails the test
/// instead of blocking the suite.
fn wait_with_timeout(child: Child) -> Output {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });
    rx.recv_timeout(TIMEOUT)
        .expect("sigreap did not exit in time")
        .expect("wait for sigreap")
}

fn run(args: &[&str]) -> Output {
    wait_with_timeout(sigreap(args).spawn().expect("spawn sigreap"))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_program_prints_usage() {
    let output = run(&[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage"), "stderr: {}", stderr(&output));
}

#[test]
fn false_exit_status_propagates() {
    let output = run(&["false"]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
}

#[test]
fn true_exits_zero_promptly() {
    let output = run(&["true"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("active: false"));
}

#[test]
fn arguments_are_passed_through() {
    let output = run(&["sh", "-c", "echo \"$0 $1\"; exit 5", "first", "--second"]);
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "first --second\n");
}

#[test]
fn signal_death_maps_to_128_plus_signo() {
    let output = run(&["sh", "-c", "kill -9 $$"]);
    assert_eq!(output.status.code(), Some(137), "stderr: {}", stderr(&output));
}

#[test]
fn exec_failure_is_reported() {
    let output = run(&["/nonexistent/sigreap-test-binary"]);
    // ENOENT from execvp in the child: exit(-2) & 0xff.
    assert_eq!(output.status.code(), Some(254));
    assert!(stderr(&output).contains("execvp"), "stderr: {}", stderr(&output));
}

#[test]
fn orphaned_grandchild_is_reaped_and_its_status_wins() {
    // The launched shell exits 3 right away; the backgrounded subshell is
    // reparented to sigreap and exits 7 later.
    let output = run(&["sh", "-c", "(sleep 0.5; exit 7) & exit 3"]);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(7), "stderr: {err}");
    assert!(err.contains("exit/kill (3)"), "stderr: {err}");
    assert!(err.contains("exit/kill (7)"), "stderr: {err}");
}

#[test]
fn term_is_forwarded_to_child() {
    let child = sigreap(&[
        "sh",
        "-c",
        "trap 'exit 42' TERM; while :; do sleep 0.05; done",
    ])
    .spawn()
    .expect("spawn sigreap");

    // Give the shell time to install its trap.
    thread::sleep(Duration::from_millis(500));
    let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits i32"));
    kill(pid, Signal::SIGTERM).expect("signal sigreap");

    let output = wait_with_timeout(child);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(42), "stderr: {err}");
    assert!(err.contains("signal: 15"), "stderr: {err}");
}

#[test]
fn user_signals_are_forwarded_too() {
    let child = sigreap(&[
        "sh",
        "-c",
        "trap 'exit 10' USR1; while :; do sleep 0.05; done",
    ])
    .spawn()
    .expect("spawn sigreap");

    thread::sleep(Duration::from_millis(500));
    let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits i32"));
    kill(pid, Signal::SIGUSR1).expect("signal sigreap");

    let output = wait_with_timeout(child);
    assert_eq!(output.status.code(), Some(10), "stderr: {}", stderr(&output));
}

#[test]
fn overflow_keeps_running_and_is_logged() {
    // 70 orphaned sleepers exceed the 64-entry tracked capacity.
    let output = run(&[
        "sh",
        "-c",
        "i=0; while [ $i -lt 70 ]; do sleep 2 & i=$((i+1)); done",
    ]);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(0), "stderr: {err}");
    assert!(err.contains("too many children"), "stderr: {err}");
}

#[test]
fn realtime_signal_death_is_recorded() {
    let signo = libc::SIGRTMIN() + 3;
    let script = format!("sleep 0.2 & wait; kill -{signo} $$");
    let output = run(&["sh", "-c", &script]);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(128 + signo), "stderr: {err}");
    assert!(err.contains(&format!("exit/kill ({})", 128 + signo)), "stderr: {err}");
}

#[test]
fn realtime_signal_is_forwarded() {
    let signo = libc::SIGRTMIN() + 3;
    let child = sigreap(&["sleep", "10"]).spawn().expect("spawn sigreap");

    thread::sleep(Duration::from_millis(500));
    let pid = i32::try_from(child.id()).expect("pid fits i32");
    // SAFETY: plain kill(2) on the supervisor we just spawned.
    let rc = unsafe { libc::kill(pid, signo) };
    assert_eq!(rc, 0);

    let output = wait_with_timeout(child);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(128 + signo), "stderr: {err}");
    assert!(err.contains(&format!("signal: {signo}")), "stderr: {err}");
}

#[test]
fn term_reaches_reparented_orphan() {
    // The launched shell exits at once; the trapping subshell is reparented
    // and only reachable through the rebuilt scratch slots.
    let child = sigreap(&[
        "sh",
        "-c",
        "(trap 'exit 9' TERM; while :; do sleep 0.05; done) & exit 0",
    ])
    .spawn()
    .expect("spawn sigreap");

    thread::sleep(Duration::from_millis(500));
    let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits i32"));
    kill(pid, Signal::SIGTERM).expect("signal sigreap");

    let output = wait_with_timeout(child);
    let err = stderr(&output);
    assert_eq!(output.status.code(), Some(9), "stderr: {err}");
    assert!(err.contains("signal: 15"), "stderr: {err}");
}
