//! Process supervisor against real child processes.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::*;
use zyngine_core::busy::BusySignal;
use zyngine_core::process::{CommandSpec, ProcessSupervisor, TerminatorFraming};

const RESPONSE: Duration = Duration::from_millis(500);

#[test]
fn start_twice_keeps_one_process() {
    let busy = BusySignal::default();
    let sup = supervisor(&["cat"], &busy);
    assert!(sup.try_start(true, false).unwrap());
    let pid = sup.pid().unwrap();
    assert!(!sup.try_start(true, false).unwrap());
    sup.start(true, false);
    assert_eq!(sup.pid(), Some(pid));
    sup.stop(Duration::from_millis(200));
    assert!(!sup.is_running());
}

#[test]
fn command_echo_round_trip() {
    let busy = BusySignal::default();
    let sup = supervisor(&["cat"], &busy);
    sup.start(true, false);
    assert_eq!(sup.send_command("hello", RESPONSE), vec!["hello"]);
    assert_eq!(sup.send_command("world", RESPONSE), vec!["world"]);
    sup.stop(Duration::from_millis(200));
    assert!(sup.send_command("after", RESPONSE).is_empty());
}

#[test]
fn response_window_shrinks_after_batch_limit() {
    let busy = BusySignal::default();
    let sup = sh(
        r#"while read l; do echo "1 $l"; echo "2 $l"; echo "3 $l"; done"#,
        &busy,
    );
    sup.start(true, false);
    let started = Instant::now();
    let lines = sup.send_command("x", Duration::from_secs(5));
    assert_eq!(lines, vec!["1 x", "2 x", "3 x"]);
    // Quiet period after the third line is the grace window, not the full timeout.
    assert!(started.elapsed() < Duration::from_secs(4));
    sup.stop(Duration::from_millis(200));
}

#[test]
fn startup_banner_is_consumed() {
    let busy = BusySignal::default();
    let sup = sh("echo banner; exec cat", &busy);
    sup.start(true, false);
    assert_eq!(sup.send_command("ping", RESPONSE), vec!["ping"]);
    sup.stop(Duration::from_millis(200));
}

#[test]
fn stderr_joins_the_output_queue() {
    let busy = BusySignal::default();
    let sup = sh(r#"while read l; do echo "err $l" >&2; done"#, &busy);
    sup.start(true, false);
    assert_eq!(sup.send_command("x", RESPONSE), vec!["err x"]);
    sup.stop(Duration::from_millis(200));
}

#[test]
fn terminator_framing_stops_at_marker() {
    let busy = BusySignal::default();
    let sup = sh(
        r#"while read l; do echo "a $l"; echo "b $l"; echo "c $l"; echo END; done"#,
        &busy,
    )
    .with_framing(Box::new(TerminatorFraming::new("END")));
    sup.start(true, false);
    assert_eq!(sup.send_command("q", Duration::from_secs(5)), vec!["a q", "b q", "c q"]);
    assert_eq!(sup.send_command("r", Duration::from_secs(5)), vec!["a r", "b r", "c r"]);
    sup.stop(Duration::from_millis(200));
}

#[test]
fn shell_mode_with_environment() {
    let busy = BusySignal::default();
    let mut command = CommandSpec::new([r#"while read l; do echo "$ZYNGINE_TEST_VAR:$l"; done"#]);
    command.set_env("ZYNGINE_TEST_VAR", "synth");
    let sup = ProcessSupervisor::new("shell", command, fast_timings(), busy.clone());
    sup.start(true, true);
    assert_eq!(sup.send_command("x", RESPONSE), vec!["synth:x"]);
    sup.stop(Duration::from_millis(200));
}

#[test]
fn without_drain_commands_return_nothing() {
    let busy = BusySignal::default();
    let sup = supervisor(&["cat"], &busy);
    sup.start(false, false);
    assert!(sup.is_running());
    assert!(sup.send_command("hello", RESPONSE).is_empty());
    sup.stop(Duration::from_millis(200));
}

#[test]
fn stop_kills_process_ignoring_term() {
    let busy = BusySignal::default();
    let sup = sh(r#"trap "" TERM; exec sleep 30"#, &busy);
    sup.start(true, false);
    assert!(sup.is_running());
    let started = Instant::now();
    assert!(sup.try_stop(Duration::from_millis(100)).unwrap());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!sup.is_running());
}

#[test]
fn health_check_reaps_exited_process() {
    let busy = BusySignal::default();
    let sup = sh("exit 3", &busy);
    sup.start(true, false);
    let mut message = None;
    assert!(wait_until(Duration::from_secs(5), || {
        message = sup.check_health();
        message.is_some()
    }));
    assert!(message.unwrap().contains("test-engine"));
    assert!(!sup.is_running());
    assert!(sup.check_health().is_none());
}

#[test]
fn busy_signal_balanced_across_lifecycle() {
    let (busy, observer) = counting_busy();
    let sup = supervisor(&["cat"], &busy);
    sup.start(true, false);
    sup.send_command("a", RESPONSE);
    sup.stop(Duration::from_millis(200));
    sup.stop(Duration::from_millis(200));
    assert_eq!(busy.count(), 0);
    assert!(observer.starts() > 0);
    assert_eq!(observer.starts(), observer.stops());
}

fn pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[test]
fn start_during_stop_waits_for_the_old_process() {
    let busy = BusySignal::default();
    let sup = Arc::new(sh(r#"trap "" TERM; exec sleep 30"#, &busy));
    sup.start(true, false);
    let old = sup.pid().unwrap();

    let stopper = {
        let sup = Arc::clone(&sup);
        thread::spawn(move || sup.try_stop(Duration::from_millis(800)))
    };
    thread::sleep(Duration::from_millis(200));
    sup.start(true, false);
    let new = sup.pid().unwrap();
    assert!(!pid_alive(old));
    assert_ne!(old, new);

    assert!(stopper.join().unwrap().unwrap());
    assert!(sup.is_running());
    sup.stop(Duration::from_millis(100));
    assert!(!pid_alive(new));
}

#[test]
fn stop_is_not_blocked_by_a_stuck_write() {
    let busy = BusySignal::default();
    let sup = Arc::new(sh(r#"trap "" TERM; exec sleep 30"#, &busy));
    sup.start(true, false);

    // Far larger than a pipe buffer, and the engine never reads.
    let flood = "x".repeat(1 << 20);
    let writer = {
        let sup = Arc::clone(&sup);
        thread::spawn(move || sup.send_command(&flood, RESPONSE))
    };
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    sup.stop(Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!sup.is_running());
    assert!(writer.join().unwrap().is_empty());
    assert_eq!(busy.count(), 0);
}

#[test]
fn drop_stops_the_process() {
    let busy = BusySignal::default();
    let sup = supervisor(&["cat"], &busy);
    sup.start(true, false);
    let pid = sup.pid().unwrap();
    drop(sup);
    assert!(!pid_alive(pid));
}
