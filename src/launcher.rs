use log::{debug, error, info};
use nix::libc::c_int;
use nix::sched::{clone, CloneCb};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::cgroup::{CgroupConfig, SandboxCgroup};
use crate::error::SandboxError;
use crate::isolate::NamespaceConfig;
use crate::outcome::ResultRecord;
use crate::pipe::SandboxPipe;
use crate::request::ExecutionRequest;
use crate::supervisor;

const STACK_SIZE: usize = 1024 * 1024;

/// Run one sandboxed execution and return its parsed result record.
///
/// Phase one of the two-phase protocol, in host namespaces: create the
/// two pipes, clone the supervisor entry into a fresh namespace set,
/// attach the child to its resource groups, release it through the
/// readiness byte, then collect and parse the single record it writes
/// back. A record that never arrives or does not parse is a hard
/// failure of the sandbox itself, distinct from the four outcomes.
pub fn launch(request: &ExecutionRequest) -> Result<ResultRecord, SandboxError> {
  let namespaces = NamespaceConfig::new(request);
  let cgroup_config = CgroupConfig::new(request);

  let (result_reader, result_writer) = SandboxPipe::new()?.split();
  let (barrier_reader, barrier_writer) = SandboxPipe::new()?.split();

  // The closure runs in the child with a copied descriptor table, so
  // it captures raw descriptors; the parent closes its copies of the
  // child ends right after the clone.
  let result_fd = result_writer.raw();
  let barrier_fd = barrier_reader.raw();
  let inherited = [result_reader.raw(), barrier_writer.raw()];

  let mut stack = vec![0u8; STACK_SIZE];
  let child = {
    let callback: CloneCb =
      Box::new(|| supervisor::enter(request, &namespaces, result_fd, barrier_fd, &inherited));
    clone(
      callback,
      stack.as_mut_slice(),
      namespaces.clone_flags(),
      Some(Signal::SIGCHLD as c_int),
    )
    .map_err(|errno| SandboxError::spawn(format!("clone fails: {}", errno)))?
  };
  info!("Spawned isolated child process #{}.", child);
  drop(result_writer);
  drop(barrier_reader);

  let cgroup = match SandboxCgroup::new(&cgroup_config, child) {
    Ok(cgroup) => cgroup,
    Err(err) => {
      // Never let the child run unconstrained
      error!("Cgroup setup fails: {}", err);
      abort_child(child);
      return Ok(ResultRecord::runtime_error("sandbox setup failed"));
    }
  };

  if let Err(err) = barrier_writer.write_byte() {
    error!("Release child fails: {}", err);
    abort_child(child);
    return Ok(ResultRecord::runtime_error("sandbox setup failed"));
  }
  debug!("Released child process #{}.", child);

  // One record, one direction, written once
  let text = result_reader.read_to_string()?;

  reap(child);

  let usage = cgroup.usage();
  debug!(
    "Cgroup usage: {} ms cpu (user {} ms, sys {} ms), {} KB memsw peak",
    usage.time(),
    usage.time_user(),
    usage.time_sys(),
    usage.memory_swap()
  );
  drop(cgroup);

  if text.trim().is_empty() {
    return Err(SandboxError::record("supervisor wrote no result record"));
  }
  let record = serde_json::from_str::<ResultRecord>(text.trim())
    .map_err(|err| SandboxError::record(format!("malformed result record: {}", err)))?;
  info!("Recv record: {:?}", record);

  Ok(record)
}

fn abort_child(child: Pid) {
  if let Err(err) = kill(child, Signal::SIGKILL) {
    error!("Kill child process #{}. fails: {}", child, err);
  }
  reap(child);
}

fn reap(child: Pid) {
  loop {
    match waitpid(child, None) {
      Ok(WaitStatus::Exited(pid, status)) => {
        info!("Child process #{}. exited with status {}", pid, status);
        break;
      }
      Ok(WaitStatus::Signaled(pid, signal, _)) => {
        info!("Child process #{}. is signaled by {}", pid, signal);
        break;
      }
      Ok(status) => {
        debug!("Child process #{}. reported {:?}", child, status);
      }
      Err(err) => {
        error!("Wait child process #{}. fails: {}", child, err);
        break;
      }
    }
  }
}
