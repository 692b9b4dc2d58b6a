use std::fs::File;
use std::io::{self, Write};
use std::os::unix::prelude::{CommandExt, ExitStatusExt, RawFd};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use nix::libc::STDOUT_FILENO;
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{close, dup2, Pid};

use crate::error::SandboxError;
use crate::isolate::NamespaceConfig;
use crate::outcome::{classify, ExecutionReport, ResultRecord};
use crate::pipe::PipeReader;
use crate::request::ExecutionRequest;

/// In-isolation entry point, invoked as the clone callback.
///
/// Runs inside the fresh namespace set. Binds stdout to the result
/// channel first; from then on exactly one serialized record ever
/// leaves this process on it.
pub(crate) fn enter(
  request: &ExecutionRequest,
  namespaces: &NamespaceConfig,
  result_fd: RawFd,
  barrier_fd: RawFd,
  inherited: &[RawFd],
) -> isize {
  for fd in inherited {
    let _ = close(*fd);
  }
  if dup2(result_fd, STDOUT_FILENO).is_err() {
    return 1;
  }
  if result_fd != STDOUT_FILENO {
    let _ = close(result_fd);
  }

  let record = match supervise(request, namespaces, barrier_fd) {
    Ok(record) => record,
    Err(err) => {
      error!("Supervision fails: {}", err);
      // Host internals stay in the log, the record carries a generic detail
      let detail = match err {
        SandboxError::Exec(_) => "program could not be started",
        _ => "sandbox setup failed",
      };
      ResultRecord::runtime_error(detail)
    }
  };

  emit(&record)
}

/// Isolate, execute and measure one untrusted program.
fn supervise(
  request: &ExecutionRequest,
  namespaces: &NamespaceConfig,
  barrier_fd: RawFd,
) -> Result<ResultRecord, SandboxError> {
  let barrier = PipeReader::from_raw(barrier_fd);

  namespaces.apply_user_mapping()?;

  // Resource limits must be attached before untrusted code may run
  if !barrier.read_byte()? {
    return Err(SandboxError::spawn("launcher closed the readiness channel"));
  }
  debug!("Readiness byte received, limits are attached");

  // I/O files live on host paths, open them before the root switch
  let stdin_file = match request.stdin() {
    Some(path) => Some(File::open(path)?),
    None => None,
  };
  let mut stdout_file = match request.stdout() {
    Some(path) => Some(File::create(path)?),
    None => None,
  };
  let mut stderr_file = match request.stderr() {
    Some(path) => Some(File::create(path)?),
    None => None,
  };

  namespaces.enter()?;

  let report = run_program(request, stdin_file)?;

  if let Some(file) = stdout_file.as_mut() {
    file.write_all(report.stdout().as_bytes())?;
  }
  if let Some(file) = stderr_file.as_mut() {
    file.write_all(report.stderr().as_bytes())?;
  }

  let outcome = classify(&report);
  info!(
    "Classified outcome status {} ({} ms, {} KB)",
    outcome.status(),
    report.time_ms(),
    report.memory_kb()
  );

  Ok(outcome.into_record())
}

/// Launch the untrusted program as its own process group, race it
/// against the wall clock and capture its termination state.
fn run_program(
  request: &ExecutionRequest,
  stdin_file: Option<File>,
) -> Result<ExecutionReport, SandboxError> {
  let (program, arguments) = request.command();
  info!("Start running program {} {}", program, arguments.join(" "));

  let mut command = Command::new(&program);
  command
    .args(&arguments)
    .env_clear()
    .process_group(0)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
  for (key, value) in request.envs() {
    command.env(key, value);
  }
  match stdin_file {
    Some(file) => {
      command.stdin(Stdio::from(file));
    }
    None => {
      command.stdin(Stdio::inherit());
    }
  }

  let start = Instant::now();
  let child = command
    .spawn()
    .map_err(|err| SandboxError::exec(format!("spawn {} fails: {}", program, err)))?;
  let pgid = Pid::from_raw(child.id() as i32);

  // The timer is the only concurrent actor racing the child
  let timed_out = Arc::new(AtomicBool::new(false));
  let fired = Arc::clone(&timed_out);
  let (cancel, deadline) = mpsc::channel::<()>();
  let time_limit = Duration::from_millis(request.time_limit_ms());
  let timer = thread::spawn(move || {
    if let Err(RecvTimeoutError::Timeout) = deadline.recv_timeout(time_limit) {
      fired.store(true, Ordering::SeqCst);
      debug!("Timer fired, killing process group {}", pgid);
      if let Err(err) = killpg(pgid, Signal::SIGKILL) {
        debug!("Kill process group {} fails: {}", pgid, err);
      }
    }
  });

  let waited = child.wait_with_output();
  let _ = cancel.send(());
  let _ = timer.join();
  let output = waited.map_err(|err| SandboxError::exec(format!("wait fails: {}", err)))?;

  // Sweep stragglers the program may have spawned
  if let Err(err) = killpg(pgid, Signal::SIGKILL) {
    debug!("Sweep process group {}: {}", pgid, err);
  }

  let elapsed = start.elapsed().as_millis() as u64;
  let usage = getrusage(UsageWho::RUSAGE_CHILDREN)?;
  let memory = usage.max_rss() as u64;

  let status = output.status.code();
  let signal = output.status.signal();
  info!(
    "Program terminated: status {:?}, signal {:?}, {} ms",
    status, signal, elapsed
  );

  Ok(
    ExecutionReport::new(
      status,
      signal,
      timed_out.load(Ordering::SeqCst),
      elapsed,
      memory,
    )
    .set_stdout(String::from_utf8_lossy(&output.stdout).into_owned())
    .set_stderr(String::from_utf8_lossy(&output.stderr).into_owned()),
  )
}

/// Write the one result record on the supervisor's stdout.
fn emit(record: &ResultRecord) -> isize {
  let text = match serde_json::to_string(record) {
    Ok(text) => text,
    Err(err) => {
      error!("Serialize record fails: {}", err);
      return 1;
    }
  };
  let mut stdout = io::stdout();
  if stdout
    .write_all(text.as_bytes())
    .and_then(|_| stdout.flush())
    .is_err()
  {
    return 1;
  }
  0
}
