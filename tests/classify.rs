use snowbox::{classify, ExecutionReport, Outcome};

const SIGKILL: i32 = 9;
const SIGSEGV: i32 = 11;

#[test]
fn it_should_accept_clean_exit() {
  let report = ExecutionReport::new(Some(0), None, false, 12, 1024).set_stdout("hi\n");
  let outcome = classify(&report);
  assert_eq!(
    outcome,
    Outcome::Accepted {
      time: 12,
      memory: 1024,
      output: "hi".to_string(),
    }
  );
}

#[test]
fn it_should_report_at_least_one_millisecond() {
  let report = ExecutionReport::new(Some(0), None, false, 0, 0);
  assert_eq!(report.time_ms(), 1);
  match classify(&report) {
    Outcome::Accepted { time, .. } => assert!(time >= 1),
    outcome => panic!("unexpected outcome: {:?}", outcome),
  }
}

#[test]
fn it_should_fault_on_error_output_despite_clean_exit() {
  let report = ExecutionReport::new(Some(0), None, false, 5, 100).set_stderr("warning: x\n");
  match classify(&report) {
    Outcome::RuntimeError { .. } => {}
    outcome => panic!("unexpected outcome: {:?}", outcome),
  }
}

#[test]
fn it_should_fault_on_nonzero_exit() {
  let report = ExecutionReport::new(Some(1), None, false, 5, 100);
  assert_eq!(
    classify(&report),
    Outcome::RuntimeError {
      detail: "exited with code 1".to_string(),
    }
  );
}

#[test]
fn it_should_fault_on_unexpected_signal() {
  let report = ExecutionReport::new(None, Some(SIGSEGV), false, 5, 100);
  assert_eq!(
    classify(&report),
    Outcome::RuntimeError {
      detail: "terminated by signal 11".to_string(),
    }
  );
}

#[test]
fn it_should_blame_the_timer_for_a_timed_out_kill() {
  let report = ExecutionReport::new(None, Some(SIGKILL), true, 600, 100);
  assert_eq!(classify(&report), Outcome::TimeLimitExceeded);
}

#[test]
fn it_should_blame_the_memory_controller_for_an_unprompted_kill() {
  let report = ExecutionReport::new(None, Some(SIGKILL), false, 80, 262144);
  assert_eq!(classify(&report), Outcome::MemoryLimitExceeded);
}

#[test]
fn it_should_map_oom_exit_status_to_memory_limit() {
  let report = ExecutionReport::new(Some(137), None, false, 80, 262144);
  assert_eq!(classify(&report), Outcome::MemoryLimitExceeded);
}

#[test]
fn it_should_ignore_a_timer_that_lost_the_race() {
  // The timer fired microseconds after a natural clean exit; the wait
  // observed no signal, so the category must not flip.
  let report = ExecutionReport::new(Some(0), None, true, 501, 100).set_stdout("done");
  match classify(&report) {
    Outcome::Accepted { .. } => {}
    outcome => panic!("unexpected outcome: {:?}", outcome),
  }
}

#[test]
fn it_should_classify_identical_reports_identically() {
  let report = ExecutionReport::new(Some(0), None, false, 42, 2048).set_stdout("out");
  let first = classify(&report);
  let second = classify(&report);
  assert_eq!(first.status(), second.status());
}
