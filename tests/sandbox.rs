use std::env;
use std::fs;
use std::path::PathBuf;

use log::info;

use snowbox::{launch, ExecutionRequest, ResultRecord, Target};

mod common;

// These scenarios drive the full launcher/supervisor pipeline, so they
// need root, user namespace clone and a writable cgroup v1 hierarchy,
// plus a prepared root filesystem carrying a shell (busybox is enough).
// Point SNOWBOX_TEST_ROOT at it, or prepare /tmp/snow.

fn test_root() -> PathBuf {
  PathBuf::from(env::var("SNOWBOX_TEST_ROOT").unwrap_or("/tmp/snow".to_string()))
}

fn run_shell(script: &str, time_limit: u64, memory_limit: u64) -> ResultRecord {
  common::setup();

  let request = ExecutionRequest::new(Target::parse("/bin/sh"), test_root())
    .arguments(vec!["-c", script])
    .time_limit(time_limit)
    .memory_limit(memory_limit)
    .cgroup("snowbox-test");

  let record = launch(&request).unwrap();
  info!("Scenario `{}` -> {:?}", script, record);
  record
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_accept_a_clean_echo() {
  let record = run_shell("echo hi", 2000, 262144);

  assert_eq!(record.status, 0);
  assert_eq!(record.output.as_deref(), Some("hi"));
  assert!(record.time.unwrap_or(0) >= 1);
  assert!(record.memory.is_some());
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_kill_a_sleeping_program_on_timeout() {
  let record = run_shell("sleep 10", 500, 262144);
  assert_eq!(record.status, 2);
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_stop_a_memory_hog_at_the_ceiling() {
  // Doubles a shell variable until the 256 MiB ceiling triggers the
  // group's OOM kill; must classify as memory limit, not runtime error
  let record = run_shell("s=x; while :; do s=$s$s; done", 10000, 262144);
  assert_eq!(record.status, 3);
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_fault_a_nonzero_exit() {
  let record = run_shell("exit 1", 2000, 262144);
  assert_eq!(record.status, 1);
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_fault_error_output_despite_exit_zero() {
  let record = run_shell("echo oops >&2", 2000, 262144);
  assert_eq!(record.status, 1);
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_feed_stdin_from_the_requested_file() {
  common::setup();

  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("input.txt");
  fs::write(&input, "1 2\n").unwrap();

  let request = ExecutionRequest::new(Target::parse("/bin/cat"), test_root())
    .set_stdin(Some(input))
    .cgroup("snowbox-test");

  let record = launch(&request).unwrap();
  assert_eq!(record.status, 0);
  assert_eq!(record.output.as_deref(), Some("1 2"));
}

#[test]
#[ignore = "requires root, userns clone and a cgroup v1 hierarchy"]
fn it_should_produce_the_same_category_twice() {
  let first = run_shell("echo again", 2000, 262144);
  let second = run_shell("echo again", 2000, 262144);
  assert_eq!(first.status, second.status);
}
